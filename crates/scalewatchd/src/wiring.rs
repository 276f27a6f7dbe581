//! Component assembly from a `WatchConfig`.
//!
//! Every adapter section of the config selects one implementation. String
//! values of the form `secret://KEY` (addresses and tokens) are resolved
//! through the configured secret backend; a missing key fails wiring.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use scalewatch_api::ApiState;
use scalewatch_autoscale::{HttpTarget, ScalingController, ScalingTarget, StoreTarget};
use scalewatch_core::config::{
    MetricsConfig, NotifyConfig, ScorerConfig, SecretsConfig, TargetConfig,
};
use scalewatch_core::{JsonClient, ScalingBounds, WatchConfig, parse_duration};
use scalewatch_loop::{DecisionLoop, LoopSettings, ReportLog};
use scalewatch_metrics::{CsvSource, HttpSource, MetricsSource, PushSource};
use scalewatch_notify::{LogSink, NotificationSink, WebhookSink};
use scalewatch_scorer::{AnomalyScorer, HttpScorer, IsolationForestScorer, ScoringBackend};
use scalewatch_secrets::{EnvBackend, SecretBackend, SecretResolver, SecretToken, StoreBackend};
use scalewatch_state::StateStore;
use tracing::info;

/// File name of the state store inside `state.data_dir`.
pub const STATE_FILE: &str = "scalewatch.redb";

const REPORT_HISTORY: usize = 256;

/// Everything the daemon runs.
pub struct Components {
    pub decisions: DecisionLoop,
    pub reports: Arc<ReportLog>,
    /// Present when `metrics.kind = "push"`.
    pub push: Option<Arc<PushSource>>,
    pub secrets: Arc<SecretResolver>,
}

impl Components {
    pub fn api_state(&self) -> ApiState {
        ApiState {
            decisions: self.decisions.clone(),
            reports: self.reports.clone(),
            push: self.push.clone(),
        }
    }
}

/// True when some adapter keeps its data in the local state store.
pub fn needs_store(config: &WatchConfig) -> bool {
    matches!(config.target, TargetConfig::Local) || matches!(config.secrets, SecretsConfig::Local)
}

pub fn open_store(config: &WatchConfig) -> anyhow::Result<StateStore> {
    let dir = &config.state.data_dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating data dir {}", dir.display()))?;
    let path = dir.join(STATE_FILE);
    let store = StateStore::open(&path)
        .with_context(|| format!("opening state store at {}", path.display()))?;
    info!(path = ?path, "state store opened");
    Ok(store)
}

pub fn secret_resolver(
    config: &WatchConfig,
    store: Option<&StateStore>,
) -> anyhow::Result<SecretResolver> {
    let backend: Arc<dyn SecretBackend> = match &config.secrets {
        SecretsConfig::Env { prefix } => Arc::new(EnvBackend::new(prefix.clone())),
        SecretsConfig::Local => {
            let Some(store) = store else {
                bail!("secrets.kind = \"local\" requires the state store");
            };
            Arc::new(StoreBackend::new(store.clone()))
        }
    };
    Ok(SecretResolver::new(backend))
}

/// Validate `config`, open the state store if needed, and wire everything.
pub async fn build(config: &WatchConfig) -> anyhow::Result<Components> {
    config.validate()?;
    let store = if needs_store(config) {
        Some(open_store(config)?)
    } else {
        None
    };
    build_with_store(config, store).await
}

/// Wire components around an already opened store.
pub async fn build_with_store(
    config: &WatchConfig,
    store: Option<StateStore>,
) -> anyhow::Result<Components> {
    let call_timeout = config.call_timeout()?;
    let secrets = Arc::new(secret_resolver(config, store.as_ref())?);
    let clients = Clients {
        secrets: &secrets,
        timeout: call_timeout,
    };

    let push = match &config.metrics {
        MetricsConfig::Push { retention } => {
            let retention = parse_duration(retention)
                .with_context(|| format!("invalid metrics.retention: {retention}"))?;
            Some(Arc::new(PushSource::new(retention)))
        }
        _ => None,
    };
    let metrics: Arc<dyn MetricsSource> = match (&config.metrics, &push) {
        (_, Some(push)) => push.clone(),
        (MetricsConfig::Csv { dir }, None) => Arc::new(CsvSource::new(dir.clone())),
        (MetricsConfig::Http { address, path, token }, None) => {
            let client = clients.build("metrics", address, token.as_deref()).await?;
            Arc::new(HttpSource::new(client, path.clone()))
        }
        (MetricsConfig::Push { .. }, None) => bail!("push buffer was not created"),
    };

    let backend: Arc<dyn ScoringBackend> = match &config.scorer {
        ScorerConfig::Http { address, path, token } => {
            let client = clients.build("scorer", address, token.as_deref()).await?;
            Arc::new(HttpScorer::new(client, path.clone()))
        }
        ScorerConfig::IsolationForest { model } => Arc::new(
            IsolationForestScorer::load(model)
                .await
                .with_context(|| format!("loading model {}", model.display()))?,
        ),
    };

    let target: Arc<dyn ScalingTarget> = match &config.target {
        TargetConfig::Local => {
            let Some(store) = store else {
                bail!("target.kind = \"local\" requires the state store");
            };
            Arc::new(StoreTarget::new(store).with_initial(config.bounds.min))
        }
        TargetConfig::Http { address, path, token } => {
            let client = clients.build("target", address, token.as_deref()).await?;
            Arc::new(HttpTarget::new(client, path.clone()))
        }
    };

    let sink: Arc<dyn NotificationSink> = match &config.notify {
        NotifyConfig::Log => Arc::new(LogSink),
        NotifyConfig::Webhook { address, path, token } => {
            let client = clients.build("notify", address, token.as_deref()).await?;
            Arc::new(WebhookSink::new(client, path.clone()))
        }
    };

    let mut controller = ScalingController::new(
        target,
        ScalingBounds::new(config.bounds.min, config.bounds.max)?,
    )
    .with_call_timeout(call_timeout);
    for id in config.service_ids() {
        let bounds = config.bounds_for(&id)?;
        controller = controller.with_bounds(id, bounds);
    }

    info!(
        metrics = metrics.name(),
        scorer = backend.name(),
        target = controller.target_name(),
        sink = sink.name(),
        secrets = secrets.backend_name(),
        services = config.services.len(),
        "components wired"
    );

    let reports = Arc::new(ReportLog::new(REPORT_HISTORY));
    let decisions = DecisionLoop::new(
        metrics,
        AnomalyScorer::new(backend),
        Arc::new(controller),
        sink,
        LoopSettings::from_config(config)?,
    )
    .with_services(config.service_ids())
    .with_report_log(reports.clone());

    Ok(Components {
        decisions,
        reports,
        push,
        secrets,
    })
}

struct Clients<'a> {
    secrets: &'a Arc<SecretResolver>,
    timeout: Duration,
}

impl Clients<'_> {
    /// A client for one adapter section. The token is resolved once here so
    /// a missing secret fails at startup, then again on every request.
    async fn build(
        &self,
        section: &str,
        address: &str,
        token: Option<&str>,
    ) -> anyhow::Result<JsonClient> {
        let resolved = self
            .secrets
            .resolve(address)
            .await
            .with_context(|| format!("resolving {section}.address"))?;
        let mut client = JsonClient::new(resolved).with_timeout(self.timeout);
        if let Some(token) = token {
            self.secrets
                .resolve(token)
                .await
                .with_context(|| format!("resolving {section}.token"))?;
            client = client.with_token(Arc::new(SecretToken::new(self.secrets.clone(), token)));
        }
        Ok(client)
    }
}
