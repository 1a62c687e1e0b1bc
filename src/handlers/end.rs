//! End - records completion

use super::JobContext;
use crate::core::EndAttrs;
use crate::template;
use chrono::Utc;
use serde_json::{json, Value};

pub(super) fn execute(attrs: &EndAttrs, ctx: &mut JobContext) -> Value {
    let message = attrs
        .message
        .as_deref()
        .map(|m| template::render(m, &ctx.context));
    ctx.log(format!("Reached end ({})", attrs.status));

    json!({
        "status": attrs.status,
        "message": message,
        "completedAt": Utc::now().to_rfc3339(),
    })
}
