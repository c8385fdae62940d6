//! Outbound mail port used for confirmation links.
//!
//! `MailgunMailer` talks to the Mailgun HTTP API with a blocking client; callers run it
//! off the async executor. `RecordingMailer` keeps messages in memory.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{LifecycleError, LifecycleResult};

const FROM_TITLE: &str = "Stores REST API";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> LifecycleResult<()>;
}

pub type SharedMailer = Arc<dyn Mailer>;

/// Subject, text and HTML bodies for a confirmation link.
pub fn confirmation_message(public_url: &str, confirmation_id: &str) -> (String, String, String) {
    let link = format!("{}/user_confirm/{}", public_url.trim_end_matches('/'), confirmation_id);
    let subject = "Registration Confirmation".to_string();
    let text = format!("Please click the link to confirm your registration: {}", link);
    let html = format!("<html>Please click the link to confirm your registration: <a href=\"{}\">link</a></html>", link);
    (subject, text, html)
}

pub struct MailgunMailer {
    api_key: Option<String>,
    domain: Option<String>,
    // Built on first send: the blocking client must not be created on an async worker.
    client: OnceLock<reqwest::blocking::Client>,
}

impl MailgunMailer {
    pub fn new(api_key: Option<String>, domain: Option<String>) -> Self {
        Self { api_key, domain, client: OnceLock::new() }
    }
}

impl Mailer for MailgunMailer {
    fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> LifecycleResult<()> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LifecycleError::MailUnavailable("failed to load mailgun api key".into()));
        };
        let Some(domain) = self.domain.as_deref() else {
            return Err(LifecycleError::MailUnavailable("failed to load mailgun domain".into()));
        };
        let from = format!("{} <do-not-reply@{}>", FROM_TITLE, domain);
        let form = [("from", from.as_str()), ("to", to), ("subject", subject), ("text", text), ("html", html)];
        let resp = self.client.get_or_init(reqwest::blocking::Client::new)
            .post(format!("https://api.mailgun.net/v3/{}/messages", domain))
            .basic_auth("api", Some(api_key))
            .form(&form)
            .send()
            .map_err(|e| {
                warn!(target: "mail", "mailgun transport error: {e}");
                LifecycleError::MailRejected(e.to_string())
            })?;
        if !resp.status().is_success() {
            warn!(target: "mail", status = resp.status().as_u16(), "mailgun rejected message");
            return Err(LifecycleError::MailRejected(format!("mailgun responded {}", resp.status())));
        }
        info!(target: "mail", to = to, subject = subject, "mail sent");
        Ok(())
    }
}

/// In-memory mailer. `set_rejecting(true)` makes sends fail with `MailRejected`.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    rejecting: Arc<Mutex<bool>>,
}

impl RecordingMailer {
    pub fn new() -> Self { Self::default() }
    pub fn set_rejecting(&self, rejecting: bool) { *self.rejecting.lock() = rejecting; }
    pub fn sent(&self) -> Vec<MailMessage> { self.sent.lock().clone() }
    pub fn last(&self) -> Option<MailMessage> { self.sent.lock().last().cloned() }
}

impl Mailer for RecordingMailer {
    fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> LifecycleResult<()> {
        if *self.rejecting.lock() {
            return Err(LifecycleError::MailRejected("recording mailer set to reject".into()));
        }
        self.sent.lock().push(MailMessage { to: to.into(), subject: subject.into(), text: text.into(), html: html.into() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_message_carries_link() {
        let (subject, text, html) = confirmation_message("http://shop.test/", "abc123");
        assert_eq!(subject, "Registration Confirmation");
        assert!(text.ends_with("http://shop.test/user_confirm/abc123"));
        assert!(html.contains("href=\"http://shop.test/user_confirm/abc123\""));
    }

    #[test]
    fn mailgun_without_configuration_is_unavailable() {
        let m = MailgunMailer::new(None, Some("mg.example.com".into()));
        assert!(matches!(m.send("a@b.c", "s", "t", "h"), Err(LifecycleError::MailUnavailable(_))));
        let m = MailgunMailer::new(Some("key".into()), None);
        assert!(matches!(m.send("a@b.c", "s", "t", "h"), Err(LifecycleError::MailUnavailable(_))));
    }

    #[test]
    fn recording_mailer_captures_and_rejects() {
        let m = RecordingMailer::new();
        m.send("a@b.c", "s", "t", "h").unwrap();
        assert_eq!(m.last().map(|x| x.to), Some("a@b.c".to_string()));
        m.set_rejecting(true);
        assert!(matches!(m.send("a@b.c", "s", "t", "h"), Err(LifecycleError::MailRejected(_))));
        assert_eq!(m.sent().len(), 1);
    }
}
