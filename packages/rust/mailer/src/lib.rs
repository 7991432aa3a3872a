//! Outbound email: layout, message building, SMTP transport, and sender rotation.
//!
//! This crate provides:
//! - [`templates`]: the email-safe HTML layout and follow-up templates
//! - [`plaintext`]: the text/plain alternative part
//! - [`message`]: lettre message construction (Reply-To, Bcc, List-Unsubscribe)
//! - [`MailTransport`]: the send seam, with [`SmtpMailer`] over lettre
//! - [`SenderRotation`]: round-robin over sender identities

pub mod message;
pub mod plaintext;
pub mod rotation;
pub mod templates;
pub mod transport;

pub use message::{ListUnsubscribe, MessageDefaults, OutgoingEmail, build_message};
pub use plaintext::html_to_text;
pub use rotation::SenderRotation;
pub use templates::{
    FOLLOWUP_TEMPLATE_COUNT, RenderedEmail, escape_html, followup_template_index,
    initial_subject, render_followup, wrap_email_html,
};
pub use transport::{MailTransport, SendError, SmtpMailer};
