//! Mail transport seam and the SMTP implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{debug, instrument};

use leadflow_shared::{SenderIdentity, SmtpConfig};

use crate::message::{MessageDefaults, OutgoingEmail, build_message};

/// SMTP reply codes that mean the credentials were refused.
const AUTH_FAILURE_CODES: &[&str] = &["530", "534", "535"];

/// Why a send failed.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The server rejected the sender's credentials; the sender is unusable.
    #[error("authentication failed for {sender}: {message}")]
    Auth { sender: String, message: String },

    /// The message could not be built (bad recipient address, etc.).
    #[error("invalid message: {0}")]
    Message(String),

    /// Connection, TLS, or delivery failure for this message.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SendError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Delivers one email as one sender.
///
/// `Ok(())` means the transport accepted the message; only then may a lead
/// be marked sent.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, sender: &SenderIdentity, email: &OutgoingEmail) -> Result<(), SendError>;
}

/// SMTP submission over implicit TLS, one pooled transport per sender.
pub struct SmtpMailer {
    host: String,
    port: u16,
    defaults: MessageDefaults,
    transports: Mutex<HashMap<String, AsyncSmtpTransport<Tokio1Executor>>>,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig) -> Self {
        Self {
            host: smtp.host.clone(),
            port: smtp.port,
            defaults: MessageDefaults::from(smtp),
            transports: Mutex::new(HashMap::new()),
        }
    }

    fn transport_for(
        &self,
        sender: &SenderIdentity,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, SendError> {
        let mut cache = self
            .transports
            .lock()
            .map_err(|_| SendError::Transport("transport cache poisoned".into()))?;

        if let Some(transport) = cache.get(&sender.address) {
            return Ok(transport.clone());
        }

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
            .map_err(|e| SendError::Transport(format!("invalid SMTP relay {}: {e}", self.host)))?
            .port(self.port)
            .credentials(Credentials::new(
                sender.address.clone(),
                sender.password.clone(),
            ))
            .build();
        cache.insert(sender.address.clone(), transport.clone());
        Ok(transport)
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    #[instrument(skip_all, fields(sender = %sender.address, to = %email.to))]
    async fn send(&self, sender: &SenderIdentity, email: &OutgoingEmail) -> Result<(), SendError> {
        let message = build_message(sender, email, &self.defaults)
            .map_err(|e| SendError::Message(e.to_string()))?;
        let transport = self.transport_for(sender)?;

        match transport.send(message).await {
            Ok(response) => {
                debug!(code = %response.code(), "message accepted");
                Ok(())
            }
            Err(e) => Err(classify(&sender.address, &e)),
        }
    }
}

fn classify(sender: &str, err: &lettre::transport::smtp::Error) -> SendError {
    let code = err.status().map(|c| c.to_string());
    classify_code(sender, code.as_deref(), err.to_string())
}

fn classify_code(sender: &str, code: Option<&str>, message: String) -> SendError {
    match code {
        Some(code) if AUTH_FAILURE_CODES.contains(&code) => SendError::Auth {
            sender: sender.to_string(),
            message,
        },
        _ => SendError::Transport(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_codes_are_classified() {
        for code in ["530", "534", "535"] {
            let err = classify_code("paul@x.ca", Some(code), "rejected".into());
            assert!(err.is_auth(), "{code}");
        }
        assert!(!classify_code("paul@x.ca", Some("550"), "mailbox unavailable".into()).is_auth());
        assert!(!classify_code("paul@x.ca", None, "connection reset".into()).is_auth());
    }

    #[test]
    fn auth_error_names_sender() {
        let err = classify_code("paul@x.ca", Some("535"), "bad credentials".into());
        assert_eq!(
            err.to_string(),
            "authentication failed for paul@x.ca: bad credentials"
        );
    }

    #[tokio::test]
    async fn invalid_recipient_is_message_error() {
        let mailer = SmtpMailer::new(&SmtpConfig::default());
        let sender = SenderIdentity {
            address: "paul@leadflow.example".into(),
            password: "pw".into(),
            display_name: "Paul".into(),
        };
        let email = OutgoingEmail {
            to: "nope".into(),
            subject: "s".into(),
            html: "<div>x</div>".into(),
        };
        let err = mailer.send(&sender, &email).await.unwrap_err();
        assert!(matches!(err, SendError::Message(_)));
    }
}
