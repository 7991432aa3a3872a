//! In-memory collaborators for stage tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use leadflow_content::ContentModel;
use leadflow_mailer::{MailTransport, OutgoingEmail, SendError};
use leadflow_shared::{LeadId, NewLead, Result, SenderIdentity};
use leadflow_storage::Storage;

pub async fn test_storage() -> Storage {
    test_storage_at().await.0
}

/// Temp-file storage plus its path, for tests that open a second connection.
pub async fn test_storage_at() -> (Storage, std::path::PathBuf) {
    let tmp = std::env::temp_dir().join(format!("lf_core_{}.db", Uuid::now_v7()));
    let storage = Storage::open(&tmp).await.expect("open test db");
    (storage, tmp)
}

pub fn lock_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("lf_core_{}.lock", Uuid::now_v7()))
}

pub fn senders(n: usize) -> Vec<SenderIdentity> {
    (1..=n)
        .map(|i| SenderIdentity {
            address: format!("s{i}@leadflow.example"),
            password: "pw".into(),
            display_name: format!("Sender {i}"),
        })
        .collect()
}

/// Insert a lead and move it to `generated`.
pub async fn generated_lead(storage: &Storage, company: &str, email: &str) -> LeadId {
    let id = storage
        .insert_lead(&NewLead::new(company, email, "import").with_category("Bakery"))
        .await
        .unwrap()
        .unwrap();
    assert!(
        storage
            .save_generated_content(&id, &format!("<div>Hello {company}</div>"))
            .await
            .unwrap()
    );
    id
}

type Script = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Content model answering from a closure.
pub struct ScriptedModel {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(script: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(prompt)
    }
}

/// A delivered message: `(sender address, email)`.
pub type Delivered = (String, OutgoingEmail);

/// Transport that records deliveries and fails on request.
#[derive(Default)]
pub struct RecordingTransport {
    delivered: Mutex<Vec<Delivered>>,
    rejected_recipients: HashSet<String>,
    bad_credentials: HashSet<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every message to `recipient` with a transport error.
    pub fn rejecting(mut self, recipient: &str) -> Self {
        self.rejected_recipients.insert(recipient.to_string());
        self
    }

    /// Fail every message from `sender` with an authentication error.
    pub fn bad_login(mut self, sender: &str) -> Self {
        self.bad_credentials.insert(sender.to_string());
        self
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, sender: &SenderIdentity, email: &OutgoingEmail) -> std::result::Result<(), SendError> {
        if self.bad_credentials.contains(&sender.address) {
            return Err(SendError::Auth {
                sender: sender.address.clone(),
                message: "535 5.7.8 Username and Password not accepted".into(),
            });
        }
        if self.rejected_recipients.contains(&email.to) {
            return Err(SendError::Transport(format!("550 mailbox unavailable: {}", email.to)));
        }
        // Let concurrent runs interleave here.
        tokio::task::yield_now().await;
        self.delivered
            .lock()
            .unwrap()
            .push((sender.address.clone(), email.clone()));
        Ok(())
    }
}
