//! Lead harvester: Places search → website scrape → lead store.
//!
//! Walks shuffled `(category, city)` query pairs, scrapes each business
//! website for an email, optionally checks the address's MX record, and
//! stores new leads until the target count or the run's time limit is reached.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, warn};

use leadflow_shared::{NewLead, Result, ScrapeConfig};
use leadflow_storage::Storage;

use crate::emails::is_free_provider;
use crate::mx::{MxVerifier, email_domain};
use crate::places::{Place, PlacesClient};
use crate::site::SiteScraper;

/// Summary of a completed harvest.
#[derive(Debug, Clone, Default)]
pub struct HarvestStats {
    /// Leads stored by this run.
    pub new_leads: usize,
    /// Businesses whose email was already known.
    pub duplicates: usize,
    /// Businesses with a website but no usable email.
    pub no_email: usize,
    /// Businesses without a website (phone-only or nothing).
    pub no_website: usize,
    pub websites_scraped: usize,
    pub queries: usize,
    /// Addresses dropped because their domain has no MX record.
    pub mx_failures: usize,
    /// Failed searches and scrapes (skipped, not fatal).
    pub errors: usize,
    pub duration: Duration,
}

/// Drives one scrape run.
pub struct Harvester<'a> {
    places: &'a PlacesClient,
    site: &'a SiteScraper,
    config: &'a ScrapeConfig,
    mx: Option<&'a dyn MxVerifier>,
}

impl<'a> Harvester<'a> {
    pub fn new(places: &'a PlacesClient, site: &'a SiteScraper, config: &'a ScrapeConfig) -> Self {
        Self {
            places,
            site,
            config,
            mx: None,
        }
    }

    /// Check every new address's domain for an MX record before storing it.
    pub fn with_mx_verifier(mut self, mx: &'a dyn MxVerifier) -> Self {
        self.mx = Some(mx);
        self
    }

    /// Run the harvest, storing new leads in `storage`.
    ///
    /// Search and scrape failures are logged and skipped; storage errors abort.
    #[instrument(skip_all, fields(target = self.config.target_leads))]
    pub async fn harvest(&self, storage: &Storage) -> Result<HarvestStats> {
        let start = Instant::now();
        let time_limit = Duration::from_secs(self.config.max_run_secs);
        let page_delay = Duration::from_millis(self.config.page_delay_ms);
        let query_delay = Duration::from_millis(self.config.query_delay_ms);

        let mut known = storage.existing_emails().await?;
        let pairs = shuffled_queries(&self.config.categories, &self.config.cities);
        let mut stats = HarvestStats::default();

        info!(
            existing = known.len(),
            queries = pairs.len(),
            max_run_secs = self.config.max_run_secs,
            "starting harvest"
        );

        'queries: for (idx, (category, city)) in pairs.iter().enumerate() {
            if self.should_stop(&stats, start, time_limit) {
                break;
            }
            if idx > 0 && !query_delay.is_zero() {
                tokio::time::sleep(query_delay).await;
            }

            let query = format!("{category} in {city}, {}", self.config.region);
            stats.queries += 1;
            let places = match self
                .places
                .search_all(&query, self.config.max_pages, page_delay)
                .await
            {
                Ok(places) => places,
                Err(e) => {
                    warn!(%query, error = %e, "places search failed");
                    stats.errors += 1;
                    continue;
                }
            };
            debug!(%query, found = places.len(), "places found");

            let label = category_label(category);
            for place in places {
                if self.should_stop(&stats, start, time_limit) {
                    break 'queries;
                }
                self.process_place(place, &label, storage, &mut known, &mut stats)
                    .await?;
            }
        }

        stats.duration = start.elapsed();
        info!(
            new_leads = stats.new_leads,
            duplicates = stats.duplicates,
            no_email = stats.no_email,
            mx_failures = stats.mx_failures,
            errors = stats.errors,
            duration_ms = stats.duration.as_millis(),
            "harvest completed"
        );
        Ok(stats)
    }

    fn should_stop(&self, stats: &HarvestStats, start: Instant, limit: Duration) -> bool {
        if stats.new_leads >= self.config.target_leads {
            info!(new_leads = stats.new_leads, "target reached");
            return true;
        }
        if start.elapsed() >= limit {
            info!("time limit reached");
            return true;
        }
        false
    }

    async fn process_place(
        &self,
        place: Place,
        label: &str,
        storage: &Storage,
        known: &mut HashSet<String>,
        stats: &mut HarvestStats,
    ) -> Result<()> {
        if place.name.is_empty() {
            return Ok(());
        }
        let Some(website) = place.website.as_deref() else {
            stats.no_website += 1;
            return Ok(());
        };

        stats.websites_scraped += 1;
        let contact = match self.site.scrape(website).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(name = %place.name, %website, error = %e, "site scrape failed");
                stats.errors += 1;
                return Ok(());
            }
        };
        let Some(email) = contact.best_email().map(str::to_string) else {
            stats.no_email += 1;
            return Ok(());
        };

        if known.contains(&email) {
            stats.duplicates += 1;
            return Ok(());
        }

        if let Some(mx) = self.mx {
            let accepts_mail = match email_domain(&email) {
                Some(domain) => mx.has_mx(&domain).await,
                None => false,
            };
            if !accepts_mail {
                warn!(name = %place.name, %email, "no MX record, skipping");
                stats.mx_failures += 1;
                return Ok(());
            }
        }

        let lead = NewLead {
            company_name: place.name.clone(),
            category: Some(label.to_string()),
            email: email.clone(),
            phone: place.phone,
            address: place.address,
            website: Some(website.to_string()),
            description: contact.description,
            source: "places".into(),
        };

        match storage.insert_lead(&lead).await? {
            Some(id) => {
                known.insert(email.clone());
                stats.new_leads += 1;
                info!(
                    lead_id = %id,
                    name = %place.name,
                    %email,
                    free_provider = is_free_provider(&email),
                    category = %label,
                    "lead stored"
                );
            }
            None => stats.duplicates += 1,
        }
        Ok(())
    }
}

/// Every `(category, city)` pair in random order.
fn shuffled_queries(categories: &[String], cities: &[String]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = categories
        .iter()
        .flat_map(|cat| cities.iter().map(move |city| (cat.clone(), city.clone())))
        .collect();
    pairs.shuffle(&mut rand::thread_rng());
    pairs
}

/// Stored category: first word of the search category, capitalized.
pub fn category_label(category: &str) -> String {
    let first = category.split_whitespace().next().unwrap_or_default();
    let mut chars = first.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
