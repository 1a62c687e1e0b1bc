//! Task - builds a task record from attributes
//!
//! There is no task backend; the payload is what a tracker integration would
//! receive.

use super::JobContext;
use crate::core::TaskAttrs;
use crate::template;
use chrono::Utc;
use serde_json::{json, Value};

pub(super) fn execute(attrs: &TaskAttrs, ctx: &mut JobContext) -> Value {
    let title = if attrs.title.trim().is_empty() {
        ctx.label.clone()
    } else {
        template::render(&attrs.title, &ctx.context)
    };
    let description = attrs
        .description
        .as_deref()
        .map(|d| template::render(d, &ctx.context));

    ctx.log(format!(
        "Task '{}' recorded{}",
        title,
        attrs
            .assignee
            .as_deref()
            .map(|a| format!(" for {}", a))
            .unwrap_or_default()
    ));

    json!({
        "task": {
            "title": title,
            "description": description,
            "assignee": attrs.assignee,
            "priority": attrs.priority,
            "dueDate": attrs.due_date,
            "tags": attrs.tags,
        },
        "status": "created",
        "createdAt": Utc::now().to_rfc3339(),
    })
}
