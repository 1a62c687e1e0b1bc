//! SendEmail - renders a message and hands it to the configured sender

use super::JobContext;
use crate::core::EmailAttrs;
use crate::email::EmailMessage;
use crate::error::JobExecutionError;
use crate::template;
use chrono::Utc;
use serde_json::{json, Value};

const HANDLER: &str = "send email";

pub(super) async fn execute(
    attrs: &EmailAttrs,
    ctx: &mut JobContext,
) -> Result<Value, JobExecutionError> {
    let sender = ctx
        .email
        .clone()
        .ok_or(JobExecutionError::MissingEmailSender)?;

    let context = &ctx.context;
    let addresses = |list: &[String]| -> Vec<String> {
        list.iter()
            .map(|address| template::render(address, context).trim().to_string())
            .filter(|address| !address.is_empty())
            .collect()
    };
    let message = EmailMessage {
        to: addresses(&attrs.to),
        cc: addresses(&attrs.cc),
        bcc: addresses(&attrs.bcc),
        subject: template::render(&attrs.subject, context),
        body: template::render(&attrs.body, context),
        html: attrs.html,
    };
    if message.to.is_empty() {
        return Err(JobExecutionError::invalid(HANDLER, "no recipients"));
    }

    ctx.log(format!(
        "Sending '{}' to {}",
        message.subject,
        message.to.join(", ")
    ));
    let receipt = sender
        .send(message.clone())
        .await
        .map_err(|e| JobExecutionError::Delivery(format!("{:#}", e)))?;
    ctx.log(format!("Delivered as {}", receipt.message_id));

    Ok(json!({
        "sent": true,
        "messageId": receipt.message_id,
        "to": message.to,
        "cc": message.cc,
        "subject": message.subject,
        "sentAt": Utc::now().to_rfc3339(),
    }))
}
