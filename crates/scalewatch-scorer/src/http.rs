//! Remote inference endpoint.

use scalewatch_core::{BoxFuture, JsonClient};
use serde::{Deserialize, Serialize};

use crate::backend::{Prediction, ScoringBackend, ScoringError};

/// POSTs `{"avg_cpu", "avg_memory", "avg_disk"}` and reads back
/// `{"label": -1|1}` (or `{"prediction": -1|1}`) with an optional `score`.
pub struct HttpScorer {
    client: JsonClient,
    path: String,
}

#[derive(Debug, Serialize)]
struct InferenceRequest {
    avg_cpu: f64,
    avg_memory: f64,
    avg_disk: f64,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(alias = "prediction")]
    label: i64,
    #[serde(default)]
    score: Option<f64>,
}

impl HttpScorer {
    pub fn new(client: JsonClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

impl ScoringBackend for HttpScorer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn invoke(&self, features: [f64; 3]) -> BoxFuture<'_, Result<Prediction, ScoringError>> {
        Box::pin(async move {
            let [avg_cpu, avg_memory, avg_disk] = features;
            let body = InferenceRequest {
                avg_cpu,
                avg_memory,
                avg_disk,
            };
            let response: InferenceResponse = self
                .client
                .post_json(&self.path, &body)
                .await
                .map_err(|e| ScoringError::Unavailable(format!("{}: {e}", self.client.address())))?;
            Ok(Prediction {
                label: response.label,
                score: response.score,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::time::Duration;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    async fn model(Json(body): Json<Value>) -> Json<Value> {
        let cpu = body["avg_cpu"].as_f64().unwrap();
        assert!(body["avg_disk"].is_number());
        if cpu > 80.0 {
            Json(json!({ "label": -1, "score": -0.2 }))
        } else {
            Json(json!({ "prediction": 1 }))
        }
    }

    #[tokio::test]
    async fn invokes_endpoint_with_feature_names() {
        let addr = serve(Router::new().route("/invocations", post(model))).await;
        let scorer = HttpScorer::new(JsonClient::new(addr), "/invocations");

        let p = scorer.invoke([95.0, 10.0, 0.0]).await.unwrap();
        assert_eq!(p, Prediction { label: -1, score: Some(-0.2) });

        // `prediction` is accepted as an alias.
        let p = scorer.invoke([5.0, 10.0, 0.0]).await.unwrap();
        assert_eq!(p.label, 1);
        assert_eq!(p.score, None);
    }

    #[tokio::test]
    async fn malformed_body_is_unavailable() {
        let app = Router::new().route(
            "/invocations",
            post(|| async { Json(json!({ "result": "ok" })) }),
        );
        let addr = serve(app).await;
        let scorer = HttpScorer::new(JsonClient::new(addr), "/invocations");
        let err = scorer.invoke([1.0, 1.0, 1.0]).await.unwrap_err();
        assert!(matches!(err, ScoringError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let app = Router::new().route(
            "/invocations",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "label": 1 }))
            }),
        );
        let addr = serve(app).await;
        let client = JsonClient::new(addr).with_timeout(Duration::from_millis(100));
        let scorer = HttpScorer::new(client, "/invocations");
        let err = scorer.invoke([1.0, 1.0, 1.0]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
