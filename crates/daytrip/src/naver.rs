//! Naver Local Search adapter.
//!
//! Runs concurrently with corpus retrieval. Every failure mode — missing
//! credentials, transport error, non-200, malformed JSON — degrades to an
//! empty result list; a turn never fails because the external API did.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;

use crate::analyzer;
use crate::config::ExternalSearchConfig;
use crate::types::{PlaceResult, QueryFilters};

/// Read-only external place search, behind a trait so tests can stub it.
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn search(&self, question: &str, filters: &QueryFilters) -> Vec<PlaceResult>;
}

#[derive(Debug, Deserialize)]
struct LocalSearchResponse {
    #[serde(default)]
    items: Vec<LocalSearchItem>,
}

#[derive(Debug, Deserialize)]
struct LocalSearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    address: String,
    #[serde(default, rename = "roadAddress")]
    road_address: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: String,
}

pub struct NaverLocalClient {
    client: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    config: ExternalSearchConfig,
}

impl NaverLocalClient {
    pub fn new(
        config: ExternalSearchConfig,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            client_id,
            client_secret,
            config,
        })
    }

    /// Credentials come from `NAVER_CLIENT_ID` / `NAVER_CLIENT_SECRET`;
    /// either missing just disables the adapter.
    pub fn from_env(config: ExternalSearchConfig) -> anyhow::Result<Self> {
        Self::new(
            config,
            std::env::var("NAVER_CLIENT_ID").ok(),
            std::env::var("NAVER_CLIENT_SECRET").ok(),
        )
    }

    /// Compact query: district short name (or the regional default) plus
    /// the category. Never the raw question — keeps the external query
    /// load low and on-topic.
    fn build_query(&self, question: &str, filters: &QueryFilters) -> String {
        let mut terms: Vec<String> = Vec::new();
        match filters.district_short() {
            Some(short) => terms.push(short),
            None => terms.push(self.config.default_region.clone()),
        }
        let category = filters
            .category
            .clone()
            .or_else(|| analyzer::extract_category(question));
        if let Some(category) = category {
            terms.push(category);
        }
        terms.join(" ")
    }

    async fn fetch(&self, query: &str) -> anyhow::Result<Vec<LocalSearchItem>> {
        let (id, secret) = match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                tracing::warn!("Naver credentials not configured, skipping local search");
                return Ok(Vec::new());
            }
        };

        let response = self
            .client
            .get(&self.config.endpoint)
            .header("X-Naver-Client-Id", id)
            .header("X-Naver-Client-Secret", secret)
            .query(&[
                ("query", query),
                ("display", &self.config.display.to_string()),
                ("start", "1"),
                ("sort", "random"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("local search API returned {}", response.status());
        }
        let parsed: LocalSearchResponse = response.json().await?;
        Ok(parsed.items)
    }

    /// Keep results in the expected region; if filtering would empty the
    /// set, keep the unfiltered results instead.
    fn filter_region(&self, items: Vec<LocalSearchItem>, filters: &QueryFilters) -> Vec<LocalSearchItem> {
        let region = filters
            .district_short()
            .unwrap_or_else(|| self.config.default_region.clone());
        let (kept, dropped): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|item| item.address.is_empty() || item.address.contains(&region));
        if kept.is_empty() {
            dropped
        } else {
            kept
        }
    }
}

#[async_trait]
impl PlaceSearch for NaverLocalClient {
    async fn search(&self, question: &str, filters: &QueryFilters) -> Vec<PlaceResult> {
        // Event corpora carry their own venue data; the local-business API
        // has nothing useful for exhibitions and concerts.
        if filters.is_event {
            tracing::debug!("event query, skipping local search");
            return Vec::new();
        }

        let query = self.build_query(question, filters);
        tracing::debug!(query = %query, "local search");

        let items = match self.fetch(&query).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "local search failed, continuing without it");
                return Vec::new();
            }
        };

        let mut regional = self.filter_region(items, filters);
        regional.shuffle(&mut rand::thread_rng());
        regional.truncate(self.config.max_results);

        regional
            .into_iter()
            .map(|item| PlaceResult {
                title: strip_bold_tags(&item.title),
                address: item.address,
                road_address: item.road_address,
                category: item.category,
                description: item.description,
                link: item.link,
            })
            .collect()
    }
}

/// Naver wraps matched terms in `<b>` tags.
fn strip_bold_tags(title: &str) -> String {
    title.replace("<b>", "").replace("</b>", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExternalSearchConfig;

    fn client() -> NaverLocalClient {
        NaverLocalClient::new(ExternalSearchConfig::default(), None, None).unwrap()
    }

    fn item(address: &str) -> LocalSearchItem {
        LocalSearchItem {
            title: "가게".to_string(),
            address: address.to_string(),
            road_address: String::new(),
            category: String::new(),
            description: String::new(),
            link: String::new(),
        }
    }

    fn filters(question: &str) -> QueryFilters {
        crate::analyzer::analyze(question)
    }

    #[test]
    fn test_build_query_uses_short_district_and_category() {
        let q = client().build_query("서울 마포구 숨은 카페", &filters("서울 마포구 숨은 카페"));
        assert_eq!(q, "마포구 카페");
    }

    #[test]
    fn test_build_query_defaults_region_when_no_district() {
        let q = client().build_query("조용한 브런치 집", &filters("조용한 브런치 집"));
        assert_eq!(q, "서울 카페");
    }

    #[test]
    fn test_region_filter_keeps_matches_and_empty_addresses() {
        let kept = client().filter_region(
            vec![item("서울 마포구 연남동"), item(""), item("부산 해운대구")],
            &filters("마포구 카페"),
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_region_filter_falls_back_when_nothing_matches() {
        let kept = client().filter_region(
            vec![item("부산 해운대구"), item("대구 중구청")],
            &filters("마포구 카페"),
        );
        assert_eq!(kept.len(), 2, "empty regional filter must keep originals");
    }

    #[tokio::test]
    async fn test_missing_credentials_yield_empty() {
        let results = client()
            .search("마포구 카페", &filters("마포구 카페"))
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_event_query_skips_search() {
        let results = client()
            .search("종로구 전시회", &filters("종로구 전시회"))
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_yields_empty() {
        // Credentials set, but the endpoint is unreachable.
        let config = ExternalSearchConfig {
            endpoint: "http://127.0.0.1:9/search".to_string(),
            timeout_secs: 1,
            ..Default::default()
        };
        let client =
            NaverLocalClient::new(config, Some("id".into()), Some("secret".into())).unwrap();
        let results = client
            .search("마포구 카페", &filters("마포구 카페"))
            .await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_strip_bold_tags() {
        assert_eq!(strip_bold_tags("<b>연남</b> 카페"), "연남 카페");
    }
}
