//! Start - records trigger metadata

use super::JobContext;
use crate::core::StartAttrs;
use chrono::Utc;
use serde_json::{json, Value};

pub(super) fn execute(attrs: &StartAttrs, ctx: &mut JobContext) -> Value {
    let triggered_at = Utc::now();
    ctx.log(format!("Triggered ({}) at {}", attrs.trigger, triggered_at.to_rfc3339()));

    json!({
        "trigger": attrs.trigger,
        "triggeredAt": triggered_at.to_rfc3339(),
        "payload": attrs.payload,
        "variables": ctx.variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::Arc;

    #[test]
    fn test_start_records_trigger() {
        let mut ctx = JobContext::new("start", Arc::new(EngineConfig::default()));
        ctx.variables.insert("env".into(), json!("staging"));
        let attrs = StartAttrs {
            trigger: "webhook".into(),
            payload: Some(json!({ "id": 7 })),
        };

        let result = execute(&attrs, &mut ctx);
        assert_eq!(result["trigger"], "webhook");
        assert_eq!(result["payload"]["id"], 7);
        assert_eq!(result["variables"]["env"], "staging");
        assert!(result["triggeredAt"].is_string());
        assert_eq!(ctx.logs().len(), 1);
    }
}
