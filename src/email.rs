//! Email delivery - the injected sender used by SendEmail jobs

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A fully rendered message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: bool,
}

/// Delivery confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailReceipt {
    pub message_id: String,
}

/// Collaborator that actually sends mail
pub trait EmailSender: Send + Sync {
    fn send(&self, message: EmailMessage) -> BoxFuture<'_, Result<EmailReceipt>>;
}

/// Writes each message as a JSON file into a directory
pub struct OutboxSender {
    dir: PathBuf,
}

impl OutboxSender {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl EmailSender for OutboxSender {
    fn send(&self, message: EmailMessage) -> BoxFuture<'_, Result<EmailReceipt>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .with_context(|| format!("creating outbox {}", self.dir.display()))?;

            let message_id = uuid::Uuid::new_v4().to_string();
            let path = self.dir.join(format!("{}.json", message_id));
            let json = serde_json::to_string_pretty(&message)?;
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;

            log::debug!("Queued email {} to {}", message_id, message.to.join(", "));
            Ok(EmailReceipt { message_id })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outbox_writes_message() {
        let dir = tempfile::tempdir().unwrap();
        let sender = OutboxSender::new(dir.path().join("outbox"));
        let message = EmailMessage {
            to: vec!["ops@example.com".into()],
            cc: vec![],
            bcc: vec![],
            subject: "Deploy finished".into(),
            body: "All green".into(),
            html: false,
        };

        let receipt = sender.send(message.clone()).await.unwrap();
        let path = dir
            .path()
            .join("outbox")
            .join(format!("{}.json", receipt.message_id));
        let written: EmailMessage =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, message);
    }
}
