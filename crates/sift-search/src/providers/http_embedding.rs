use super::{build_client, post_json};
use crate::embedding::{EmbeddingProvider, MAX_EMBED_BATCH};
use async_trait::async_trait;
use serde::Deserialize;
use sift_core::{EmbeddingVector, SiftError, SiftResult};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// OpenAI-compatible embeddings endpoint (`POST {base}/v1/embeddings`).
pub struct HttpEmbeddingProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    batch_size: usize,
    http: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        dimension: usize,
        batch_size: usize,
        timeout: Duration,
    ) -> SiftResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            dimension,
            batch_size: batch_size.clamp(1, MAX_EMBED_BATCH),
            http: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> SiftResult<EmbeddingVector> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            SiftError::UpstreamUnavailable(format!("{}: empty embedding response", self.name()))
        })
    }

    async fn embed_documents(&self, texts: &[String]) -> SiftResult<Vec<EmbeddingVector>> {
        if texts.len() > self.batch_size {
            return Err(SiftError::BatchTooLarge {
                size: texts.len(),
                max: self.batch_size,
            });
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let resp: EmbeddingsResponse =
            post_json(&self.http, self.name(), &url, self.api_key.as_deref(), &body).await?;

        if resp.data.len() != texts.len() {
            return Err(SiftError::UpstreamUnavailable(format!(
                "{}: expected {} embeddings, got {}",
                self.name(),
                texts.len(),
                resp.data.len()
            )));
        }

        // Entries may arrive out of order; `index` is authoritative when present.
        let mut slots: Vec<Option<EmbeddingVector>> = vec![None; texts.len()];
        for (position, datum) in resp.data.into_iter().enumerate() {
            let index = datum.index.unwrap_or(position);
            match slots.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(datum.embedding),
                _ => {
                    return Err(SiftError::UpstreamUnavailable(format!(
                        "{}: invalid or duplicate embedding index {index}",
                        self.name()
                    )))
                }
            }
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    SiftError::UpstreamUnavailable(format!("{}: missing embedding", self.name()))
                })
            })
            .collect()
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "http-embedding"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, timeout: Duration) -> HttpEmbeddingProvider {
        HttpEmbeddingProvider::new(
            &server.uri(),
            "text-embedding-004",
            Some("test-key".into()),
            3,
            250,
            timeout,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_embed_documents_orders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "text-embedding-004", "input": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0, 0.0]},
                    {"index": 0, "embedding": [1.0, 0.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server, Duration::from_secs(5));
        let vectors = p
            .embed_documents(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn test_embed_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.5, 0.5, 0.0]}]
            })))
            .mount(&server)
            .await;

        let v = provider(&server, Duration::from_secs(5))
            .embed_query("fall risk")
            .await
            .unwrap();
        assert_eq!(v, vec![0.5, 0.5, 0.0]);
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = provider(&server, Duration::from_secs(5))
            .embed_query("q")
            .await
            .unwrap_err();
        assert!(matches!(err, SiftError::UpstreamUnavailable(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn test_slow_server_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = provider(&server, Duration::from_millis(100))
            .embed_query("q")
            .await
            .unwrap_err();
        assert!(matches!(err, SiftError::UpstreamTimeout(_)), "{err}");
    }

    #[tokio::test]
    async fn test_malformed_body_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = provider(&server, Duration::from_secs(5))
            .embed_query("q")
            .await
            .unwrap_err();
        assert!(matches!(err, SiftError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let texts: Vec<String> = (0..251).map(|i| i.to_string()).collect();
        let err = provider(&server, Duration::from_secs(5))
            .embed_documents(&texts)
            .await
            .unwrap_err();
        assert!(matches!(err, SiftError::BatchTooLarge { size: 251, max: 250 }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let p = HttpEmbeddingProvider::new(
            "http://127.0.0.1:9",
            "m",
            None,
            3,
            250,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = p.embed_query("q").await.unwrap_err();
        assert!(err.is_upstream());
    }
}
