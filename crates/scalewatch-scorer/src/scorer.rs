//! Sample → verdict, single and batched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scalewatch_core::{AnomalyVerdict, MetricSample};
use tracing::debug;

use crate::backend::{ScoringBackend, ScoringError};

/// Wraps a [`ScoringBackend`] and attaches severity to its answers.
#[derive(Clone)]
pub struct AnomalyScorer {
    backend: Arc<dyn ScoringBackend>,
    call_timeout: Option<Duration>,
}

impl AnomalyScorer {
    pub fn new(backend: Arc<dyn ScoringBackend>) -> Self {
        Self {
            backend,
            call_timeout: None,
        }
    }

    /// Bound every backend invocation. A batch of `n` samples may take up
    /// to `n` times this long in total.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Score one sample. Severity is 1 when anomalous, 0 otherwise.
    pub async fn score(&self, sample: MetricSample) -> Result<AnomalyVerdict, ScoringError> {
        let (anomalous, score) = self.classify(&sample).await?;
        let verdict = if anomalous {
            AnomalyVerdict::anomalous(sample, 1)
        } else {
            AnomalyVerdict::normal(sample)
        };
        Ok(verdict.with_score(score))
    }

    /// Score a batch. Verdicts come back in input order; each carries the
    /// number of anomalous samples seen for its service across the batch.
    ///
    /// One failing sample fails the whole batch.
    pub async fn score_many(
        &self,
        samples: Vec<MetricSample>,
    ) -> Result<Vec<AnomalyVerdict>, ScoringError> {
        let mut classified = Vec::with_capacity(samples.len());
        for sample in samples {
            let (anomalous, score) = self.classify(&sample).await?;
            classified.push((sample, anomalous, score));
        }

        let mut severity: HashMap<String, u32> = HashMap::new();
        for (sample, anomalous, _) in &classified {
            if *anomalous {
                *severity.entry(sample.service_id.clone()).or_default() += 1;
            }
        }

        Ok(classified
            .into_iter()
            .map(|(sample, anomalous, score)| {
                let count = severity.get(&sample.service_id).copied().unwrap_or(0);
                let verdict = AnomalyVerdict {
                    sample,
                    is_anomalous: anomalous,
                    severity_count: count,
                    score: None,
                };
                verdict.with_score(score)
            })
            .collect())
    }

    async fn classify(&self, sample: &MetricSample) -> Result<(bool, Option<f64>), ScoringError> {
        let call = self.backend.invoke(sample.features());
        let prediction = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ScoringError::Unavailable(format!(
                    "{} timed out after {limit:?}",
                    self.backend.name()
                ))
            })??,
            None => call.await?,
        };
        let anomalous = prediction.is_anomalous()?;
        debug!(
            service = %sample.service_id,
            instance = sample.instance_id.as_deref().unwrap_or("-"),
            backend = self.backend.name(),
            anomalous,
            score = prediction.score,
            "sample scored"
        );
        Ok((anomalous, prediction.score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Prediction;
    use scalewatch_core::{BoxFuture, ResourceReadings, Window};

    /// Flags any vector whose CPU exceeds the threshold.
    struct CpuThreshold(f64);

    impl ScoringBackend for CpuThreshold {
        fn name(&self) -> &'static str {
            "threshold"
        }

        fn invoke(&self, features: [f64; 3]) -> BoxFuture<'_, Result<Prediction, ScoringError>> {
            let label = if features[0] > self.0 { -1 } else { 1 };
            Box::pin(async move {
                Ok(Prediction {
                    label,
                    score: Some(features[0]),
                })
            })
        }
    }

    struct FixedLabel(i64);

    impl ScoringBackend for FixedLabel {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn invoke(&self, _features: [f64; 3]) -> BoxFuture<'_, Result<Prediction, ScoringError>> {
            let label = self.0;
            Box::pin(async move { Ok(Prediction { label, score: None }) })
        }
    }

    /// Answers normal after a fixed delay.
    struct Delayed(Duration);

    impl ScoringBackend for Delayed {
        fn name(&self) -> &'static str {
            "delayed"
        }

        fn invoke(&self, _features: [f64; 3]) -> BoxFuture<'_, Result<Prediction, ScoringError>> {
            let delay = self.0;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(Prediction {
                    label: 1,
                    score: None,
                })
            })
        }
    }

    fn sample(service: &str, cpu: f64) -> MetricSample {
        MetricSample::new(
            service,
            Window { start: 0, end: 300 },
            ResourceReadings::new(cpu, 10.0, 10.0),
        )
        .unwrap()
    }

    fn scorer() -> AnomalyScorer {
        AnomalyScorer::new(Arc::new(CpuThreshold(80.0)))
    }

    #[tokio::test]
    async fn single_anomalous_sample_has_severity_one() {
        let v = scorer().score(sample("api", 95.0)).await.unwrap();
        assert!(v.is_anomalous);
        assert_eq!(v.severity_count, 1);
        assert_eq!(v.score, Some(95.0));
    }

    #[tokio::test]
    async fn single_normal_sample_has_severity_zero() {
        let v = scorer().score(sample("api", 20.0)).await.unwrap();
        assert!(!v.is_anomalous);
        assert_eq!(v.severity_count, 0);
    }

    #[tokio::test]
    async fn batch_severity_is_grouped_by_service() {
        let verdicts = scorer()
            .score_many(vec![
                sample("a", 90.0),
                sample("b", 99.0),
                sample("a", 10.0),
                sample("a", 85.0),
            ])
            .await
            .unwrap();

        let summary: Vec<(&str, bool, u32)> = verdicts
            .iter()
            .map(|v| (v.service_id(), v.is_anomalous, v.severity_count))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a", true, 2),
                ("b", true, 1),
                ("a", false, 2),
                ("a", true, 2),
            ]
        );
    }

    #[tokio::test]
    async fn batch_without_anomalies_has_zero_severity() {
        let verdicts = scorer()
            .score_many(vec![sample("a", 1.0), sample("a", 2.0)])
            .await
            .unwrap();
        assert!(verdicts.iter().all(|v| v.severity_count == 0 && !v.is_anomalous));
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        assert!(scorer().score_many(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unexpected_label_is_an_error_not_normal() {
        let scorer = AnomalyScorer::new(Arc::new(FixedLabel(0)));
        let err = scorer.score(sample("api", 1.0)).await.unwrap_err();
        assert!(matches!(err, ScoringError::InvalidLabel(0)));

        let err = scorer.score_many(vec![sample("api", 1.0)]).await.unwrap_err();
        assert!(matches!(err, ScoringError::InvalidLabel(0)));
    }

    #[tokio::test]
    async fn timeout_applies_to_each_invocation() {
        let scorer = AnomalyScorer::new(Arc::new(Delayed(Duration::from_millis(40))))
            .with_call_timeout(Duration::from_millis(150));
        let batch: Vec<_> = (0..5).map(|i| sample("api", f64::from(i))).collect();

        // Five calls take longer than one limit in total, but none exceeds it.
        let verdicts = scorer.score_many(batch).await.unwrap();
        assert_eq!(verdicts.len(), 5);
    }

    #[tokio::test]
    async fn slow_invocation_is_unavailable() {
        let scorer = AnomalyScorer::new(Arc::new(Delayed(Duration::from_secs(30))))
            .with_call_timeout(Duration::from_millis(20));

        let err = scorer.score(sample("api", 1.0)).await.unwrap_err();
        assert!(
            matches!(&err, ScoringError::Unavailable(msg) if msg.contains("delayed timed out")),
            "{err:?}"
        );
        let err = scorer
            .score_many(vec![sample("api", 1.0), sample("api", 2.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::Unavailable(_)), "{err:?}");
    }
}
