//! Content generation stage: `new` leads → LLM HTML → `generated`.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use leadflow_content::{ContentModel, PromptInput, build_prompt, clean_response};
use leadflow_shared::{Lead, OutreachConfig, Result};
use leadflow_storage::Storage;

use crate::progress::ProgressReporter;

/// Outcome of a generation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateStats {
    pub generated: usize,
    /// Leads whose request or response failed; left `new` with `last_error`.
    pub failed: usize,
    pub duration: Duration,
}

/// Generate content for every lead still in `new`.
///
/// Model and cleanup failures are recorded on the lead and skipped.
/// Fatal errors (a rejected API key, storage) abort the pass.
#[instrument(skip_all, fields(model = model.name()))]
pub async fn generate_pending(
    storage: &Storage,
    model: &dyn ContentModel,
    outreach: &OutreachConfig,
    request_delay: Duration,
    progress: &dyn ProgressReporter,
) -> Result<GenerateStats> {
    let start = Instant::now();
    let pending = storage.list_pending_generation().await?;
    let total = pending.len();
    let mut stats = GenerateStats::default();

    progress.phase("Generating content");
    info!(pending = total, "starting generation");

    for (i, lead) in pending.iter().enumerate() {
        if i > 0 && !request_delay.is_zero() {
            tokio::time::sleep(request_delay).await;
        }

        match generate_one(model, lead, outreach).await {
            Ok(html) => {
                if storage.save_generated_content(&lead.id, &html).await? {
                    stats.generated += 1;
                    info!(lead_id = %lead.id, company = %lead.company_name, bytes = html.len(), "content generated");
                } else {
                    warn!(lead_id = %lead.id, "lead left `new` during generation, content discarded");
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(lead_id = %lead.id, company = %lead.company_name, error = %e, "generation failed");
                storage.set_lead_error(&lead.id, &e.to_string()).await?;
                stats.failed += 1;
            }
        }
        progress.item(i + 1, total, &lead.company_name);
    }

    stats.duration = start.elapsed();
    progress.finish(&format!(
        "{} generated, {} failed",
        stats.generated, stats.failed
    ));
    info!(
        generated = stats.generated,
        failed = stats.failed,
        duration_ms = stats.duration.as_millis(),
        "generation complete"
    );
    Ok(stats)
}

async fn generate_one(model: &dyn ContentModel, lead: &Lead, outreach: &OutreachConfig) -> Result<String> {
    let prompt = build_prompt(PromptInput::from(lead), outreach);
    let raw = model.generate(&prompt).await?;
    clean_response(&raw)
}
