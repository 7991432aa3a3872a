//! Google Places (New) text search client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use leadflow_shared::{LeadflowError, Result};

const FIELD_MASK: &str = "places.displayName,places.formattedAddress,places.nationalPhoneNumber,\
places.websiteUri,places.id,nextPageToken";

/// Results requested per page (the API maximum).
const PAGE_SIZE: u32 = 20;

/// A business returned by the search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

/// One page of results.
#[derive(Debug, Clone, Default)]
pub struct PlacesPage {
    pub places: Vec<Place>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    places: Vec<RawPlace>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlace {
    #[serde(default)]
    id: String,
    display_name: Option<LocalizedText>,
    formatted_address: Option<String>,
    national_phone_number: Option<String>,
    website_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    #[serde(default)]
    text: String,
}

impl From<RawPlace> for Place {
    fn from(raw: RawPlace) -> Self {
        let non_empty = |s: Option<String>| {
            s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };
        Self {
            place_id: raw.id,
            name: raw
                .display_name
                .map(|n| n.text.trim().to_string())
                .unwrap_or_default(),
            address: non_empty(raw.formatted_address),
            phone: non_empty(raw.national_phone_number),
            website: non_empty(raw.website_uri),
        }
    }
}

/// Client for `places:searchText`.
pub struct PlacesClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl PlacesClient {
    /// Create a client for `endpoint` (the full `places:searchText` URL).
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| LeadflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// Fetch one page of results for `query`.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn search(&self, query: &str, page_token: Option<&str>) -> Result<PlacesPage> {
        let mut body = serde_json::json!({
            "textQuery": query,
            "pageSize": PAGE_SIZE,
        });
        if let Some(token) = page_token {
            body["pageToken"] = serde_json::Value::String(token.to_string());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await
            .map_err(|e| LeadflowError::Network(format!("places search failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LeadflowError::Network(format!(
                "places search returned HTTP {status}: {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| LeadflowError::parse(format!("invalid places response: {e}")))?;

        let places: Vec<Place> = parsed.places.into_iter().map(Place::from).collect();
        debug!(count = places.len(), more = parsed.next_page_token.is_some(), "places page");

        Ok(PlacesPage {
            places,
            next_page_token: parsed.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// Fetch up to `max_pages` pages for `query`, waiting `page_delay`
    /// before each follow-up page.
    pub async fn search_all(
        &self,
        query: &str,
        max_pages: u32,
        page_delay: Duration,
    ) -> Result<Vec<Place>> {
        let mut all = Vec::new();
        let mut token: Option<String> = None;

        for page in 0..max_pages.max(1) {
            if page > 0 && !page_delay.is_zero() {
                tokio::time::sleep(page_delay).await;
            }
            let result = self.search(query, token.as_deref()).await?;
            all.extend(result.places);

            match result.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PlacesClient {
        PlacesClient::new(format!("{}/v1/places:searchText", server.uri()), "test-key").unwrap()
    }

    #[tokio::test]
    async fn parses_places_and_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/places:searchText"))
            .and(header("X-Goog-Api-Key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "textQuery": "bakeries in Toronto, Ontario",
                "pageSize": 20
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "places": [
                    {
                        "id": "p1",
                        "displayName": { "text": " Sweet Crumbs " },
                        "formattedAddress": "1 King St W, Toronto",
                        "nationalPhoneNumber": "(416) 555-0100",
                        "websiteUri": "https://sweetcrumbs.ca/"
                    },
                    { "id": "p2", "displayName": { "text": "No Site Bakery" } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .search("bakeries in Toronto, Ontario", None)
            .await
            .unwrap();
        assert_eq!(page.places.len(), 2);
        assert_eq!(page.places[0].name, "Sweet Crumbs");
        assert_eq!(page.places[0].website.as_deref(), Some("https://sweetcrumbs.ca/"));
        assert!(page.places[1].website.is_none());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn follows_page_tokens_up_to_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "pageToken": "tok-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "places": [{ "id": "b", "displayName": { "text": "Second" } }],
                "nextPageToken": "tok-3"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "places": [{ "id": "a", "displayName": { "text": "First" } }],
                "nextPageToken": "tok-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let places = client_for(&server)
            .search_all("gyms in Markham, Ontario", 2, Duration::ZERO)
            .await
            .unwrap();
        let names: Vec<&str> = places.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn http_error_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key invalid"))
            .mount(&server)
            .await;

        let err = client_for(&server).search("x", None).await.unwrap_err();
        assert!(matches!(err, LeadflowError::Network(_)));
        assert!(err.to_string().contains("403"));
    }
}
