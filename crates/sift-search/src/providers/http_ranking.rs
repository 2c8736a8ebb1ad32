use super::{build_client, post_json};
use crate::rerank::{RankRecord, RankedRecord, RankingProvider};
use async_trait::async_trait;
use serde::Deserialize;
use sift_core::SiftResult;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RankResponse {
    #[serde(default)]
    records: Vec<RankedRecord>,
}

/// Ranking endpoint (`POST {base}/v1/rank`).
///
/// Request: `{"model", "query", "topN", "records": [{"id", "title", "content"}]}`.
/// Response: `{"records": [{"id", "score"}]}`.
pub struct HttpRankingProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpRankingProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> SiftResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            http: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl RankingProvider for HttpRankingProvider {
    async fn rank(
        &self,
        query: &str,
        records: &[RankRecord],
        top_n: usize,
    ) -> SiftResult<Vec<RankedRecord>> {
        let url = format!("{}/v1/rank", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "topN": top_n,
            "records": records,
        });
        let resp: RankResponse =
            post_json(&self.http, self.name(), &url, self.api_key.as_deref(), &body).await?;
        Ok(resp.records)
    }

    fn name(&self) -> &str {
        "http-ranking"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use sift_core::SiftError;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn records() -> Vec<RankRecord> {
        vec![
            RankRecord {
                id: "kb-1".into(),
                title: "Fall prevention".into(),
                content: "Fall prevention\nBed rails".into(),
            },
            RankRecord {
                id: "kb-2".into(),
                title: "Medication".into(),
                content: "Medication\nTimings".into(),
            },
        ]
    }

    #[tokio::test]
    async fn test_rank_sends_records_and_parses_scores() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rank"))
            .and(body_partial_json(json!({
                "model": "semantic-ranker-default-004",
                "query": "fall",
                "topN": 1,
                "records": [{"id": "kb-1", "title": "Fall prevention"}, {"id": "kb-2"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": "kb-1", "score": 0.93}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpRankingProvider::new(
            &server.uri(),
            "semantic-ranker-default-004",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let ranked = provider.rank("fall", &records(), 1).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "kb-1");
        assert!((ranked[0].score - 0.93).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rank_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rank"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider =
            HttpRankingProvider::new(&server.uri(), "m", None, Duration::from_secs(5)).unwrap();
        let err = provider.rank("q", &records(), 2).await.unwrap_err();
        assert!(matches!(err, SiftError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_records_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let provider =
            HttpRankingProvider::new(&server.uri(), "m", None, Duration::from_secs(5)).unwrap();
        assert!(provider.rank("q", &records(), 2).await.unwrap().is_empty());
    }
}
