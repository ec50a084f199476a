//! SMTP sender for email steps and warmup exchanges

use super::{ChannelSender, SendOutcome, SendRequest};
use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// How the SMTP connection is secured, derived from the account's port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Security {
    /// Implicit TLS (port 465)
    Tls,
    StartTls,
    /// Plain connection to a local relay
    None,
}

fn security_for(host: &str, port: u16) -> Security {
    match port {
        465 => Security::Tls,
        25 | 1025 if host == "localhost" || host == "127.0.0.1" => Security::None,
        _ => Security::StartTls,
    }
}

/// Sends email through each account's own SMTP server
pub struct SmtpSender {
    hostname: String,
    timeout: Duration,
}

impl SmtpSender {
    /// `hostname` is used in generated Message-IDs
    pub fn new(hostname: impl Into<String>, timeout: Duration) -> Self {
        Self {
            hostname: hostname.into(),
            timeout,
        }
    }

    fn message_id(&self) -> String {
        format!("<{}.{}@{}>", Uuid::new_v4(), Utc::now().timestamp(), self.hostname)
    }

    fn build_message(&self, request: &SendRequest, message_id: &str) -> Result<Message, String> {
        let from: Mailbox = match &request.account.display_name {
            Some(name) => format!("{} <{}>", name, request.account.email).parse(),
            None => request.account.email.parse(),
        }
        .map_err(|e| format!("Invalid from address: {}", e))?;

        let to: Mailbox = match &request.target.name {
            Some(name) => format!("{} <{}>", name, request.target.email).parse(),
            None => request.target.email.parse(),
        }
        .map_err(|e| format!("Invalid to address: {}", e))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .message_id(Some(message_id.to_string()))
            .subject(request.subject.clone().unwrap_or_default());

        let email = match &request.html_body {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(request.body.clone()))
                    .singlepart(SinglePart::html(html.clone())),
            ),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(request.body.clone()),
        };

        email.map_err(|e| format!("Failed to build email: {}", e))
    }

    fn transport(&self, request: &SendRequest) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
        let account = &request.account;
        let host = account
            .smtp_host
            .as_deref()
            .ok_or_else(|| format!("Account {} has no SMTP host", account.id))?;
        let port = account.smtp_port.and_then(|p| u16::try_from(p).ok()).unwrap_or(587);

        let mut builder = match security_for(host, port) {
            Security::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| format!("Failed to create SMTP transport: {}", e))?,
            Security::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| format!("Failed to create SMTP transport: {}", e))?,
            Security::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        }
        .port(port);

        if let (Some(username), Some(password)) = (&account.smtp_username, &account.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.timeout(Some(self.timeout)).build())
    }
}

/// Recipient-level permanent rejection
fn is_hard_bounce(error: &str) -> bool {
    error.contains("5.1.1")
        || error.contains("550")
        || error.contains("User unknown")
        || error.contains("does not exist")
}

#[async_trait]
impl ChannelSender for SmtpSender {
    async fn send(&self, request: &SendRequest) -> SendOutcome {
        let message_id = self.message_id();

        let email = match self.build_message(request, &message_id) {
            Ok(email) => email,
            Err(e) => return SendOutcome::failed(e),
        };
        let mailer = match self.transport(request) {
            Ok(mailer) => mailer,
            Err(e) => return SendOutcome::failed(e),
        };

        match mailer.send(email).await {
            Ok(response) => {
                debug!(
                    account_id = %request.account.id,
                    code = %response.code(),
                    "Email accepted"
                );
                SendOutcome::sent(message_id)
            }
            Err(e) => {
                let error = e.to_string();
                if is_hard_bounce(&error) {
                    SendOutcome::bounced(error)
                } else {
                    SendOutcome::failed(error)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::SendTarget;
    use crate::testing::account_row;
    use outreach_common::types::{Channel, ChannelAction};

    fn request() -> SendRequest {
        SendRequest {
            channel: Channel::Email,
            action: ChannelAction::Send,
            account: account_row(Channel::Email, 10, 0),
            target: SendTarget {
                email: "lead@example.org".to_string(),
                name: Some("Lee Ead".to_string()),
                profile_url: None,
            },
            subject: Some("Quick question".to_string()),
            body: "Hello Lee".to_string(),
            html_body: Some("<p>Hello Lee</p>".to_string()),
        }
    }

    #[test]
    fn test_security_by_port() {
        assert_eq!(security_for("smtp.example.com", 465), Security::Tls);
        assert_eq!(security_for("smtp.example.com", 587), Security::StartTls);
        assert_eq!(security_for("localhost", 1025), Security::None);
        assert_eq!(security_for("smtp.example.com", 25), Security::StartTls);
    }

    #[test]
    fn test_build_message_sets_message_id() {
        let sender = SmtpSender::new("outreach.example.com", Duration::from_secs(5));
        let id = sender.message_id();
        assert!(id.ends_with("@outreach.example.com>"));

        let message = sender.build_message(&request(), &id).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains(&id));
        assert!(raw.contains("Subject: Quick question"));
    }

    #[tokio::test]
    async fn test_missing_smtp_host_fails_without_network() {
        let sender = SmtpSender::new("localhost", Duration::from_secs(1));
        let outcome = sender.send(&request()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("no SMTP host"));
    }

    #[test]
    fn test_hard_bounce_detection() {
        assert!(is_hard_bounce("permanent error (550): 5.1.1 User unknown"));
        assert!(!is_hard_bounce("transient error (421): try again later"));
    }
}
