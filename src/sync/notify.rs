//! Notification dispatch

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use super::{Result, SyncError};
use crate::core::config::IngestionConfig;

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// Optional attachment as `(file name, contents)`
    pub attachment: Option<(String, String)>,
}

pub trait Notifier {
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes messages as `.eml`-style files into the outbox directory.
/// Without recipients nothing is written.
pub struct OutboxNotifier {
    recipients: Vec<String>,
    outbox_dir: Option<PathBuf>,
}

impl OutboxNotifier {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            recipients: config.notification.recipients.clone(),
            outbox_dir: config.notification.outbox_dir.clone(),
        }
    }

    fn file_name(subject: &str) -> String {
        let stem: String = crate::core::identity::slugify(subject)
            .chars()
            .take(60)
            .collect();
        format!(
            "{}-{}.eml",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            stem
        )
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        if self.recipients.is_empty() {
            debug!(subject = %notification.subject, "no recipients configured, notification skipped");
            return Ok(());
        }
        let Some(dir) = &self.outbox_dir else {
            info!(subject = %notification.subject, to = ?self.recipients, "notification (no outbox directory)");
            return Ok(());
        };

        let mut message = format!(
            "To: {}\nSubject: {}\n\n{}",
            self.recipients.join(", "),
            notification.subject,
            notification.body
        );
        if let Some((name, contents)) = &notification.attachment {
            message.push_str(&format!("\n\n--- attachment: {} ---\n{}", name, contents));
        }

        std::fs::create_dir_all(dir)
            .map_err(|e| SyncError::Transport(format!("{}: {}", dir.display(), e)))?;
        let path = dir.join(Self::file_name(&notification.subject));
        std::fs::write(&path, message)
            .map_err(|e| SyncError::Transport(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), to = ?self.recipients, "notification written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn notification() -> Notification {
        Notification {
            subject: "Ingestion report".to_string(),
            body: "1 created".to_string(),
            attachment: Some(("report.csv".to_string(), "error_key,message\n".to_string())),
        }
    }

    #[test]
    fn test_no_recipients_is_noop() {
        let tmp = tempdir().unwrap();
        let mut config = IngestionConfig::default();
        config.notification.outbox_dir = Some(tmp.path().to_path_buf());

        OutboxNotifier::new(&config).send(&notification()).unwrap();
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_writes_message_file() {
        let tmp = tempdir().unwrap();
        let mut config = IngestionConfig::default();
        config.notification.outbox_dir = Some(tmp.path().join("outbox"));
        config.notification.recipients = vec!["ops@example.com".to_string()];

        OutboxNotifier::new(&config).send(&notification()).unwrap();
        let files: Vec<_> = std::fs::read_dir(tmp.path().join("outbox"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert!(content.starts_with("To: ops@example.com"));
        assert!(content.contains("report.csv"));
    }
}
