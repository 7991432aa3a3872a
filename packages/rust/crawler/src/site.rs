//! Business website scraper: finds a contact email and a short description.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use leadflow_shared::{LeadflowError, Result};

use crate::emails::extract_emails;

/// User-Agent string for website requests.
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; Leadflow/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Pages tried in order; the first one yielding an email wins.
const CONTACT_SLUGS: &[&str] = &["", "/contact", "/contact-us", "/about", "/about-us", "/get-in-touch"];

/// Longest description kept, in characters.
const MAX_DESCRIPTION_LEN: usize = 300;

/// What a website revealed about the business.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteContact {
    /// Candidate emails, best first.
    pub emails: Vec<String>,
    /// `<meta name="description">` of the first page that had one.
    pub description: Option<String>,
}

impl SiteContact {
    pub fn best_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}

enum PageFetch {
    Loaded(String),
    /// The page answered but is unusable (e.g. 404); move to the next slug.
    Missing,
}

/// Fetches a business site and the usual contact pages.
pub struct SiteScraper {
    client: Client,
    max_retries: u32,
    retry_backoff: Duration,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl SiteScraper {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| LeadflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: 2,
            retry_backoff: Duration::from_secs(2),
            allow_localhost: false,
        })
    }

    /// Base delay between retries; attempt `n` waits `n * backoff`.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Allow scraping localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Scrape `website` for contact emails.
    ///
    /// Unreachable pages are skipped after retries; only a refused target
    /// (bad URL or SSRF guard) is an error.
    #[instrument(skip_all, fields(website = %website))]
    pub async fn scrape(&self, website: &str) -> Result<SiteContact> {
        let base = Url::parse(website.trim())
            .map_err(|e| LeadflowError::validation(format!("invalid website '{website}': {e}")))?;

        if !self.allow_localhost && is_ssrf_target(&base) {
            warn!(url = %base, "SSRF protection: blocked");
            return Err(LeadflowError::validation(format!(
                "refusing to fetch {base}: private or non-HTTP target"
            )));
        }

        let root = base.as_str().trim_end_matches('/').to_string();
        let mut contact = SiteContact::default();

        for slug in CONTACT_SLUGS {
            let url = format!("{root}{slug}");
            let Some(html) = self.fetch_with_retry(&url).await else {
                continue;
            };

            let doc = Html::parse_document(&html);
            if contact.description.is_none() {
                contact.description = meta_description(&doc);
            }

            let emails = extract_emails(&html, Some(base.as_str()));
            if !emails.is_empty() {
                debug!(%url, found = emails.len(), "emails found");
                contact.emails = emails;
                break;
            }
        }

        Ok(contact)
    }

    async fn fetch_with_retry(&self, url: &str) -> Option<String> {
        for attempt in 0..=self.max_retries {
            match self.fetch(url).await {
                Ok(PageFetch::Loaded(body)) => return Some(body),
                Ok(PageFetch::Missing) => return None,
                Err(e) => {
                    debug!(%url, attempt, error = %e, "page fetch failed");
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_backoff * (attempt + 1)).await;
                    }
                }
            }
        }
        None
    }

    async fn fetch(&self, url: &str) -> Result<PageFetch> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LeadflowError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LeadflowError::Network(format!("{url}: HTTP {status}")));
        }
        if !status.is_success() {
            return Ok(PageFetch::Missing);
        }

        let body = response
            .text()
            .await
            .map_err(|e| LeadflowError::Network(format!("{url}: body read failed: {e}")))?;
        Ok(PageFetch::Loaded(body))
    }
}

/// `<meta name="description">`, falling back to `og:description`.
fn meta_description(doc: &Html) -> Option<String> {
    let selectors = [
        r#"meta[name="description"]"#,
        r#"meta[name="Description"]"#,
        r#"meta[property="og:description"]"#,
    ];
    selectors.iter().find_map(|s| {
        let selector = Selector::parse(s).ok()?;
        let content = doc.select(&selector).next()?.value().attr("content")?;
        let text = content.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return None;
        }
        Some(text.chars().take(MAX_DESCRIPTION_LEN).collect())
    })
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scraper() -> SiteScraper {
        SiteScraper::new()
            .unwrap()
            .with_retry_backoff(Duration::ZERO)
            .allow_localhost()
    }

    #[tokio::test]
    async fn falls_through_to_contact_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><meta name="description" content="Family bakery
                   since 1987."></head><body>Welcome</body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contact"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contact-us"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>Reach us at hello@crumbs.ca or crumbs@gmail.com</p>"),
            )
            .mount(&server)
            .await;

        let contact = scraper().scrape(&server.uri()).await.unwrap();
        assert_eq!(contact.emails.len(), 2);
        assert_eq!(contact.description.as_deref(), Some("Family bakery since 1987."));
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("info@fixit.ca"))
            .mount(&server)
            .await;

        let contact = scraper().scrape(&server.uri()).await.unwrap();
        assert_eq!(contact.best_email(), Some("info@fixit.ca"));
    }

    #[tokio::test]
    async fn site_without_emails_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Call us!</p>"))
            .mount(&server)
            .await;

        let contact = scraper().scrape(&server.uri()).await.unwrap();
        assert!(contact.emails.is_empty());
        assert!(contact.best_email().is_none());
    }

    #[tokio::test]
    async fn blocks_private_targets() {
        let scraper = SiteScraper::new().unwrap();
        assert!(scraper.scrape("http://127.0.0.1:8080/").await.is_err());
        assert!(scraper.scrape("file:///etc/passwd").await.is_err());
    }

    #[test]
    fn ssrf_classification() {
        for blocked in [
            "http://192.168.1.1/admin",
            "http://10.0.0.1/",
            "http://localhost:3000/",
            "http://printer.local/",
            "http://[::1]/",
        ] {
            assert!(is_ssrf_target(&Url::parse(blocked).unwrap()), "{blocked}");
        }
        assert!(!is_ssrf_target(&Url::parse("https://sweetcrumbs.ca/").unwrap()));
    }
}
