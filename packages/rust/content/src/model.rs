//! The content-model seam used by the generation stage.

use async_trait::async_trait;

use leadflow_shared::Result;

/// Something that turns a prompt into raw model text.
///
/// Implementations return the model's text untouched; callers run it
/// through [`crate::clean_response`].
#[async_trait]
pub trait ContentModel: Send + Sync {
    /// Model identifier, for logging.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}
