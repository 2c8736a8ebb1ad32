//! HTTP implementations of the embedding and ranking provider traits.

mod http_embedding;
mod http_ranking;

pub use http_embedding::HttpEmbeddingProvider;
pub use http_ranking::HttpRankingProvider;

use crate::config::{EmbeddingBackend, EmbeddingConfig, RerankerBackend, RerankerConfig};
use crate::embedding::{EmbeddingProvider, LocalEmbedding};
use crate::rerank::RankingProvider;
use sift_core::{SiftError, SiftResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the embedding provider named by `config`.
pub fn build_embedding_provider(
    config: &EmbeddingConfig,
    timeout: Duration,
) -> SiftResult<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingBackend::Local => Arc::new(LocalEmbedding::new(config.dimension)),
        EmbeddingBackend::Http => Arc::new(HttpEmbeddingProvider::new(
            &config.base_url,
            &config.model,
            config.api_key(),
            config.dimension,
            config.batch_size,
            timeout,
        )?),
    };
    info!(provider = provider.name(), dimension = provider.dimension(), "Embedding provider ready");
    Ok(provider)
}

/// Build the ranking provider named by `config`, or `None` when reranking is off.
pub fn build_ranking_provider(
    config: &RerankerConfig,
    timeout: Duration,
) -> SiftResult<Option<Arc<dyn RankingProvider>>> {
    match config.provider {
        RerankerBackend::None => Ok(None),
        RerankerBackend::Http => {
            let provider =
                HttpRankingProvider::new(&config.base_url, &config.model, config.api_key(), timeout)?;
            info!(model = %config.model, "Ranking provider ready");
            Ok(Some(Arc::new(provider)))
        }
    }
}

fn build_client(timeout: Duration) -> SiftResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SiftError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Classify a transport failure.
fn map_request_error(provider: &str, e: &reqwest::Error) -> SiftError {
    if e.is_timeout() {
        SiftError::UpstreamTimeout(format!("{provider}: {e}"))
    } else {
        SiftError::UpstreamUnavailable(format!("{provider}: {e}"))
    }
}

/// POST `body` as JSON and decode a 2xx JSON response.
async fn post_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    provider: &str,
    url: &str,
    api_key: Option<&str>,
    body: &serde_json::Value,
) -> SiftResult<T> {
    let mut request = http.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let resp = request
        .send()
        .await
        .map_err(|e| map_request_error(provider, &e))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(SiftError::UpstreamUnavailable(format!(
            "{provider} API error {status}: {text}"
        )));
    }

    resp.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            SiftError::UpstreamTimeout(format!("{provider}: {e}"))
        } else {
            SiftError::UpstreamUnavailable(format!("{provider}: malformed response: {e}"))
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_local_embedding_by_default() {
        let provider =
            build_embedding_provider(&EmbeddingConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(provider.name(), "local");
        assert_eq!(provider.dimension(), 256);
    }

    #[test]
    fn test_no_ranking_provider_by_default() {
        let provider =
            build_ranking_provider(&RerankerConfig::default(), Duration::from_secs(1)).unwrap();
        assert!(provider.is_none());
    }

    #[test]
    fn test_build_http_providers() {
        let embedding = EmbeddingConfig {
            provider: EmbeddingBackend::Http,
            ..EmbeddingConfig::default()
        };
        let provider = build_embedding_provider(&embedding, Duration::from_secs(1)).unwrap();
        assert_eq!(provider.name(), "http-embedding");

        let reranker = RerankerConfig {
            provider: RerankerBackend::Http,
            ..RerankerConfig::default()
        };
        assert!(build_ranking_provider(&reranker, Duration::from_secs(1))
            .unwrap()
            .is_some());
    }
}
