//! Lead sourcing: Places search, website email scraping, and CSV import.
//!
//! This crate provides:
//! - [`places`]: Google Places text search client
//! - [`site`]: contact-page scraper with SSRF protection
//! - [`emails`]: email extraction, junk filtering and ranking
//! - [`mx`]: MX record check for scraped addresses
//! - [`engine`]: the [`Harvester`] that turns search results into leads
//! - [`import`]: CSV import

pub mod emails;
pub mod engine;
pub mod import;
pub mod mx;
pub mod places;
pub mod site;

pub use emails::{extract_emails, is_free_provider};
pub use engine::{HarvestStats, Harvester, category_label};
pub use import::{ImportRow, ImportStats, import_csv, import_rows, parse_row};
pub use mx::{DnsMxVerifier, MxVerifier, email_domain};
pub use places::{Place, PlacesClient, PlacesPage};
pub use site::{SiteContact, SiteScraper};
