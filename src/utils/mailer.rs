//! Outgoing mail.
//!
//! Delivery is best-effort: [`dispatch`] hands the message to a spawned task
//! and the request that triggered it never waits on, or fails because of,
//! the mail backend.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn confirmation_code(from: &str, to: &str, username: &str, code: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: "Your confirmation code".to_string(),
            body: format!(
                "Hello, {}!\n\nYour confirmation code: {}\n\n\
                 Exchange it at /api/v1/auth/token/ together with your username.\n",
                username, code
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), String>;
}

/// Writes mail to the application log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), String> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "Outgoing mail:\n{}",
            email.body
        );
        Ok(())
    }
}

/// Writes each message as a file in a directory.
pub struct FileMailer {
    dir: PathBuf,
}

impl FileMailer {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl Mailer for FileMailer {
    async fn send(&self, email: Email) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| e.to_string())?;

        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%.6f");
        let path = self.dir.join(format!("{}-{}.eml", stamp, sanitize(&email.to)));
        let contents = format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}",
            email.from, email.to, email.subject, email.body
        );

        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| e.to_string())
    }
}

fn sanitize(address: &str) -> String {
    address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}

/// Picks the backend from configuration.
pub fn from_config(config: &Config) -> Arc<dyn Mailer> {
    match &config.mail_dir {
        Some(dir) => Arc::new(FileMailer::new(dir.clone())),
        None => Arc::new(LogMailer),
    }
}

/// Sends in the background. Failures are logged.
pub fn dispatch(mailer: Arc<dyn Mailer>, email: Email) {
    tokio::spawn(async move {
        let to = email.to.clone();
        if let Err(e) = mailer.send(email).await {
            tracing::error!("Failed to deliver mail to {}: {}", to, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_mail_carries_code() {
        let email = Email::confirmation_code("noreply@x", "alice@example.com", "alice", "1a-XYZ");
        assert_eq!(email.to, "alice@example.com");
        assert!(email.body.contains("1a-XYZ"));
    }

    #[test]
    fn file_names_are_safe() {
        assert_eq!(sanitize("a+b@c.d/../e"), "a_b_c.d_.._e");
    }

    #[tokio::test]
    async fn file_mailer_writes_message() {
        let dir = std::env::temp_dir().join(format!("titlehub-mail-{}", std::process::id()));
        let mailer = FileMailer::new(dir.clone());
        mailer
            .send(Email::confirmation_code("noreply@x", "bob@example.com", "bob", "ff-CODE"))
            .await
            .unwrap();

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        let entry = entries.next_entry().await.unwrap().expect("one message");
        let contents = tokio::fs::read_to_string(entry.path()).await.unwrap();
        assert!(contents.contains("To: bob@example.com"));
        assert!(contents.contains("ff-CODE"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
