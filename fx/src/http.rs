//! HTTP rate fetcher for vatcomply-compatible rate APIs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use fxquote_common::CurrencyPair;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{FetchError, FetchResult};
use crate::provider::RateFetcher;

/// Default public endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.vatcomply.com";

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[allow(dead_code)]
    base: Option<String>,
    rates: HashMap<String, Decimal>,
}

/// Fetches rates with `GET {base_url}/rates?base={BASE}`.
pub struct HttpRateFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRateFetcher {
    /// Create a fetcher whose requests are bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("fxquote/0.1")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn classify(pair: &CurrencyPair, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(pair.clone())
        } else {
            FetchError::Network {
                pair: pair.clone(),
                detail: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl RateFetcher for HttpRateFetcher {
    fn name(&self) -> &str {
        "vatcomply"
    }

    #[instrument(name = "HttpRateFetch", skip(self), fields(pair = %pair))]
    async fn fetch_rate(&self, pair: &CurrencyPair) -> FetchResult<Decimal> {
        let url = format!("{}/rates", self.base_url);
        debug!(url = %url, base = %pair.base, "Requesting rates");

        let response = self
            .client
            .get(&url)
            .query(&[("base", pair.base.code())])
            .send()
            .await
            .map_err(|e| Self::classify(pair, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadUpstreamResponse {
                pair: pair.clone(),
                detail: format!("HTTP error: {status}"),
            });
        }

        let text = response.text().await.map_err(|e| Self::classify(pair, e))?;
        let data: RatesResponse =
            serde_json::from_str(&text).map_err(|e| FetchError::BadUpstreamResponse {
                pair: pair.clone(),
                detail: format!("failed to parse JSON response: {e}"),
            })?;

        data.rates
            .get(pair.quote.code())
            .copied()
            .ok_or_else(|| FetchError::RateNotAvailable(pair.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchFailureKind;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn usd_eur() -> CurrencyPair {
        CurrencyPair::parse("USD/EUR").unwrap()
    }

    async fn mount_rates(server: &MockServer, base: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/rates"))
            .and(query_param("base", base))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let server = MockServer::start().await;
        let body = r#"{"date": "2024-05-01", "base": "USD", "rates": {"EUR": 0.92, "JPY": 151.3}}"#;
        mount_rates(&server, "USD", ResponseTemplate::new(200).set_body_string(body)).await;

        let fetcher = HttpRateFetcher::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let rate = fetcher.fetch_rate(&usd_eur()).await.unwrap();
        assert_eq!(rate, dec!(0.92));
    }

    #[tokio::test]
    async fn test_missing_quote_currency() {
        let server = MockServer::start().await;
        let body = r#"{"base": "USD", "rates": {"JPY": 151.3}}"#;
        mount_rates(&server, "USD", ResponseTemplate::new(200).set_body_string(body)).await;

        let fetcher = HttpRateFetcher::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch_rate(&usd_eur()).await.unwrap_err();
        assert_eq!(err, FetchError::RateNotAvailable(usd_eur()));
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let server = MockServer::start().await;
        mount_rates(&server, "USD", ResponseTemplate::new(500)).await;

        let fetcher = HttpRateFetcher::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch_rate(&usd_eur()).await.unwrap_err();
        assert_eq!(err.kind(), FetchFailureKind::BadUpstreamResponse);
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        let body = r#"{"base": "USD", "rate": {"EUR": 0.92}}"#;
        mount_rates(&server, "USD", ResponseTemplate::new(200).set_body_string(body)).await;

        let fetcher = HttpRateFetcher::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch_rate(&usd_eur()).await.unwrap_err();
        assert_eq!(err.kind(), FetchFailureKind::BadUpstreamResponse);
        assert!(err.to_string().contains("failed to parse JSON response"));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        let body = r#"{"base": "USD", "rates": {"EUR": 0.92}}"#;
        mount_rates(
            &server,
            "USD",
            ResponseTemplate::new(200)
                .set_body_string(body)
                .set_delay(Duration::from_millis(500)),
        )
        .await;

        let fetcher = HttpRateFetcher::new(&server.uri(), Duration::from_millis(50)).unwrap();
        let err = fetcher.fetch_rate(&usd_eur()).await.unwrap_err();
        assert_eq!(err.kind(), FetchFailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_network_error() {
        // Nothing listens on port 9 of the loopback interface.
        let fetcher = HttpRateFetcher::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch_rate(&usd_eur()).await.unwrap_err();
        assert_eq!(err.kind(), FetchFailureKind::Network);
    }
}
