//! MIME message construction.

use lettre::Message;
use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart};

use leadflow_shared::{LeadflowError, Result, SenderIdentity, SmtpConfig};

use crate::plaintext::html_to_text;

/// A single email to deliver: recipient, subject and full HTML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Headers shared by every message of a run.
#[derive(Debug, Clone, Default)]
pub struct MessageDefaults {
    pub reply_to: Option<String>,
    pub bcc: Option<String>,
    pub unsubscribe_mailbox: Option<String>,
}

impl From<&SmtpConfig> for MessageDefaults {
    fn from(smtp: &SmtpConfig) -> Self {
        let clean = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self {
            reply_to: clean(&smtp.reply_to),
            bcc: clean(&smtp.bcc),
            unsubscribe_mailbox: clean(&smtp.unsubscribe_mailbox),
        }
    }
}

/// `List-Unsubscribe` header carrying a `mailto:` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListUnsubscribe(String);

impl ListUnsubscribe {
    pub fn mailto(mailbox: &str) -> Self {
        Self(format!("<mailto:{mailbox}?subject=unsubscribe>"))
    }
}

impl Header for ListUnsubscribe {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("List-Unsubscribe")
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

fn mailbox(addr: &str, what: &str) -> Result<Mailbox> {
    addr.trim()
        .parse::<Mailbox>()
        .map_err(|e| LeadflowError::validation(format!("invalid {what} address '{addr}': {e}")))
}

/// Build the multipart/alternative message `sender` sends for `email`.
pub fn build_message(
    sender: &SenderIdentity,
    email: &OutgoingEmail,
    defaults: &MessageDefaults,
) -> Result<Message> {
    let from_addr = sender
        .address
        .trim()
        .parse()
        .map_err(|e| LeadflowError::validation(format!("invalid sender address '{}': {e}", sender.address)))?;
    let from = Mailbox::new(Some(sender.display_name.clone()), from_addr);

    let mut builder = Message::builder()
        .from(from)
        .to(mailbox(&email.to, "recipient")?)
        .subject(email.subject.clone());

    if let Some(reply_to) = &defaults.reply_to {
        builder = builder.reply_to(mailbox(reply_to, "reply-to")?);
    }
    if let Some(bcc) = &defaults.bcc {
        builder = builder.bcc(mailbox(bcc, "bcc")?);
    }
    let unsubscribe = defaults
        .unsubscribe_mailbox
        .as_deref()
        .or(defaults.reply_to.as_deref())
        .unwrap_or(sender.address.as_str());
    builder = builder.header(ListUnsubscribe::mailto(unsubscribe.trim()));

    let text = html_to_text(&email.html);
    builder
        .multipart(MultiPart::alternative_plain_html(text, email.html.clone()))
        .map_err(|e| LeadflowError::Mail(format!("failed to build message: {e}")))
}
