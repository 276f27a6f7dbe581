//! The decision cycle: fetch, score, decide, notify.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use scalewatch_autoscale::ScalingController;
use scalewatch_core::config::NotifyPolicy;
use scalewatch_core::{
    AnomalyVerdict, ConfigError, CycleError, CycleReport, NotificationEvent, ScalingDecision,
    WatchConfig, Window,
};
use scalewatch_metrics::MetricsSource;
use scalewatch_notify::NotificationSink;
use scalewatch_scorer::AnomalyScorer;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::reports::ReportLog;

/// Per-cycle knobs shared by every service.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Length of the metrics window ending at cycle start.
    pub window: Duration,
    /// Upper bound on each external call. A batch is scored one sample per
    /// call, so each sample gets the full limit.
    pub call_timeout: Duration,
    pub topic: String,
    pub notify_on: NotifyPolicy,
    /// Fetch and score one sample per instance instead of one per service.
    pub batch: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            call_timeout: Duration::from_secs(10),
            topic: "scalewatch.decisions".to_string(),
            notify_on: NotifyPolicy::Always,
            batch: true,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &WatchConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            window: config.window()?,
            call_timeout: config.call_timeout()?,
            topic: config.cycle.topic.clone(),
            notify_on: config.cycle.notify_on,
            batch: config.cycle.batch,
        })
    }
}

/// Runs decision cycles against a fixed set of collaborators.
///
/// Cloning is cheap; clones share the collaborators and the report log.
#[derive(Clone)]
pub struct DecisionLoop {
    metrics: Arc<dyn MetricsSource>,
    scorer: AnomalyScorer,
    controller: Arc<ScalingController>,
    sink: Arc<dyn NotificationSink>,
    settings: Arc<LoopSettings>,
    services: Arc<Vec<String>>,
    reports: Option<Arc<ReportLog>>,
}

impl DecisionLoop {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        scorer: AnomalyScorer,
        controller: Arc<ScalingController>,
        sink: Arc<dyn NotificationSink>,
        settings: LoopSettings,
    ) -> Self {
        let scorer = match scorer.call_timeout() {
            Some(_) => scorer,
            None => scorer.with_call_timeout(settings.call_timeout),
        };
        Self {
            metrics,
            scorer,
            controller,
            sink,
            settings: Arc::new(settings),
            services: Arc::new(Vec::new()),
            reports: None,
        }
    }

    /// Services covered by [`run_all`](Self::run_all) and the scheduled loop.
    pub fn with_services(mut self, service_ids: Vec<String>) -> Self {
        self.services = Arc::new(service_ids);
        self
    }

    /// Keep every finished report in `log`.
    pub fn with_report_log(mut self, log: Arc<ReportLog>) -> Self {
        self.reports = Some(log);
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn controller(&self) -> &ScalingController {
        &self.controller
    }

    pub fn report_log(&self) -> Option<&Arc<ReportLog>> {
        self.reports.as_ref()
    }

    /// One full cycle for one service. Never fails; failures are in the report.
    pub async fn run_cycle(&self, service_id: &str) -> CycleReport {
        let mut report = CycleReport::begin(service_id);
        let outcome = self.execute(service_id, &mut report).await;
        let report = match outcome {
            Ok(()) => {
                let decision = report.decision.as_ref();
                info!(
                    service = %service_id,
                    anomalous = report.verdict.as_ref().is_some_and(|v| v.is_anomalous),
                    from = decision.map(|d| d.previous_count),
                    to = decision.map(|d| d.new_count),
                    notified = report.notification_sent,
                    "cycle complete"
                );
                report.finish()
            }
            Err(e) => {
                error!(service = %service_id, kind = ?e.kind(), error = %e, "cycle failed");
                report.fail(e)
            }
        };

        if let Some(log) = &self.reports {
            log.push(report.clone());
        }
        report
    }

    async fn execute(&self, service_id: &str, report: &mut CycleReport) -> Result<(), CycleError> {
        let window = Window::last(self.settings.window);

        let verdict = if self.settings.batch {
            self.score_batch(service_id, window).await?
        } else {
            let sample = self
                .bounded(
                    CycleError::MetricsUnavailable,
                    self.metrics.fetch(service_id, window),
                )
                .await?;
            self.scorer.score(sample).await?
        };
        report.verdict = Some(verdict.clone());

        // Scoring calls, target reads and target writes carry their own timeouts.
        let decision = self.controller.decide(service_id, &verdict).await?;
        report.decision = Some(decision.clone());

        if !should_notify(self.settings.notify_on, &verdict, &decision) {
            debug!(service = %service_id, policy = ?self.settings.notify_on, "notification skipped");
            return Ok(());
        }

        let event = NotificationEvent::new(verdict, decision);
        let published = self
            .bounded(
                CycleError::NotificationFailed,
                self.sink.publish(&self.settings.topic, &event),
            )
            .await;
        match published {
            Ok(()) => report.notification_sent = true,
            Err(e) => {
                warn!(service = %service_id, sink = self.sink.name(), error = %e, "notification not delivered");
                report.notification_error = Some(e);
            }
        }
        Ok(())
    }

    async fn score_batch(
        &self,
        service_id: &str,
        window: Window,
    ) -> Result<AnomalyVerdict, CycleError> {
        let samples = self
            .bounded(
                CycleError::MetricsUnavailable,
                self.metrics.fetch_batch(service_id, window),
            )
            .await?;
        if samples.is_empty() {
            return Err(CycleError::MetricsUnavailable(format!(
                "{} returned an empty batch for {service_id}",
                self.metrics.name()
            )));
        }
        debug!(service = %service_id, samples = samples.len(), "batch fetched");

        let verdicts = self.scorer.score_many(samples).await?;
        representative(verdicts).ok_or_else(|| {
            CycleError::ScoringUnavailable(format!("no verdict returned for {service_id}"))
        })
    }

    /// Await an external call under the call timeout.
    async fn bounded<T, E>(
        &self,
        stage: fn(String) -> CycleError,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, CycleError>
    where
        E: Into<CycleError>,
    {
        let limit = self.settings.call_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(stage(format!("timed out after {limit:?}"))),
        }
    }

    /// Run cycles for several services concurrently, one task each.
    ///
    /// Reports come back in input order. A cycle whose task panicked is
    /// logged and left out; the others are unaffected.
    pub async fn run_many(&self, service_ids: &[String]) -> Vec<CycleReport> {
        let handles: Vec<_> = service_ids
            .iter()
            .map(|id| {
                let this = self.clone();
                let task_id = id.clone();
                (
                    id.clone(),
                    tokio::spawn(async move { this.run_cycle(&task_id).await }),
                )
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (service_id, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => error!(service = %service_id, error = %e, "cycle task aborted"),
            }
        }
        reports
    }

    /// Cycles for every configured service.
    pub async fn run_all(&self) -> Vec<CycleReport> {
        let services = Arc::clone(&self.services);
        self.run_many(&services).await
    }

    /// Scheduled loop: all services every `interval` until shutdown.
    ///
    /// A cycle in progress is allowed to finish.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            services = self.services.len(),
            "decision loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let reports = self.run_all().await;
                    let failed = reports.iter().filter(|r| !r.is_success()).count();
                    let scaled = reports.iter().filter(|r| r.scaled()).count();
                    info!(cycles = reports.len(), failed, scaled, "scheduled cycles complete");
                }
                _ = shutdown.changed() => {
                    info!("decision loop shutting down");
                    break;
                }
            }
        }
    }
}

fn should_notify(policy: NotifyPolicy, verdict: &AnomalyVerdict, decision: &ScalingDecision) -> bool {
    match policy {
        NotifyPolicy::Always => true,
        NotifyPolicy::Anomaly => verdict.is_anomalous,
        NotifyPolicy::Change => !decision.is_noop(),
    }
}

/// The verdict a batch is reported and scaled by: the first anomalous one,
/// else the first.
fn representative(verdicts: Vec<AnomalyVerdict>) -> Option<AnomalyVerdict> {
    let first_anomalous = verdicts.iter().position(|v| v.is_anomalous).unwrap_or(0);
    verdicts.into_iter().nth(first_anomalous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalewatch_core::{MetricSample, ResourceReadings};

    fn verdict(instance: &str, anomalous: bool, severity: u32) -> AnomalyVerdict {
        let sample = MetricSample::new(
            "api",
            Window { start: 0, end: 300 },
            ResourceReadings::new(10.0, 10.0, 10.0),
        )
        .unwrap()
        .with_instance(instance);
        AnomalyVerdict {
            sample,
            is_anomalous: anomalous,
            severity_count: severity,
            score: None,
        }
    }

    fn decision(previous: u32, new: u32) -> ScalingDecision {
        ScalingDecision {
            service_id: "api".into(),
            previous_count: previous,
            new_count: new,
            bound_min: 1,
            bound_max: 10,
        }
    }

    #[test]
    fn representative_prefers_first_anomalous() {
        let picked = representative(vec![
            verdict("i-1", false, 2),
            verdict("i-2", true, 2),
            verdict("i-3", true, 2),
        ])
        .unwrap();
        assert_eq!(picked.sample.instance_id.as_deref(), Some("i-2"));
    }

    #[test]
    fn representative_falls_back_to_first() {
        let picked = representative(vec![verdict("i-1", false, 0), verdict("i-2", false, 0)])
            .unwrap();
        assert_eq!(picked.sample.instance_id.as_deref(), Some("i-1"));
        assert!(representative(Vec::new()).is_none());
    }

    #[test]
    fn notify_policies() {
        let clean = verdict("i", false, 0);
        let hot = verdict("i", true, 1);
        let same = decision(3, 3);
        let changed = decision(3, 4);

        assert!(should_notify(NotifyPolicy::Always, &clean, &same));
        assert!(!should_notify(NotifyPolicy::Anomaly, &clean, &same));
        assert!(should_notify(NotifyPolicy::Anomaly, &hot, &same));
        assert!(!should_notify(NotifyPolicy::Change, &hot, &same));
        assert!(should_notify(NotifyPolicy::Change, &hot, &changed));
    }

    #[test]
    fn settings_follow_config() {
        let mut config = WatchConfig::scaffold(&["api"]);
        config.cycle.window = "2m".into();
        config.cycle.call_timeout = "750ms".into();
        config.cycle.notify_on = NotifyPolicy::Change;
        config.cycle.batch = false;

        let settings = LoopSettings::from_config(&config).unwrap();
        assert_eq!(settings.window, Duration::from_secs(120));
        assert_eq!(settings.call_timeout, Duration::from_millis(750));
        assert_eq!(settings.notify_on, NotifyPolicy::Change);
        assert!(!settings.batch);

        config.cycle.window = "soon".into();
        assert!(LoopSettings::from_config(&config).is_err());
    }
}
