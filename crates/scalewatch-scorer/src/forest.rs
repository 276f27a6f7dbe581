//! In-process Isolation Forest inference.
//!
//! The model artifact is exported after offline training as JSON:
//!
//! ```json
//! {
//!   "scaler": { "mean": [50.0, 50.0, 20.0], "scale": [15.0, 12.0, 8.0] },
//!   "offset": -0.5,
//!   "max_samples": 256,
//!   "trees": [
//!     { "nodes": [
//!         { "kind": "split", "feature": 0, "threshold": 1.7, "left": 1, "right": 2 },
//!         { "kind": "leaf", "samples": 250 },
//!         { "kind": "leaf", "samples": 6 }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A sample's anomaly score is `-2^(-E[h(x)] / c(max_samples))`, where `h` is
//! the isolation path length in each tree (depth plus the expected remaining
//! depth `c(n)` of the `n` training samples left at the leaf). The sample is
//! an outlier when `score - offset < 0`.

use std::path::Path;

use scalewatch_core::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{ANOMALY_LABEL, NORMAL_LABEL, Prediction, ScoringBackend, ScoringError};

const FEATURES: usize = 3;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Standardization applied before the trees see a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: [f64; FEATURES],
    pub scale: [f64; FEATURES],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        samples: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    #[serde(default)]
    pub scaler: Option<Scaler>,
    pub offset: f64,
    pub max_samples: u64,
    pub trees: Vec<Tree>,
}

impl IsolationForest {
    pub fn from_json(content: &str) -> Result<Self, ScoringError> {
        let model: Self =
            serde_json::from_str(content).map_err(|e| ScoringError::Model(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub async fn from_file(path: &Path) -> Result<Self, ScoringError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ScoringError::Model(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Structural checks: every split points forward to an existing node and
    /// names a known feature, so traversal always terminates.
    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.trees.is_empty() {
            return Err(ScoringError::Model("no trees".into()));
        }
        // c(1) is zero, which would leave every score undefined.
        if self.max_samples < 2 {
            return Err(ScoringError::Model("max_samples must be at least 2".into()));
        }
        if !self.offset.is_finite() {
            return Err(ScoringError::Model("offset must be finite".into()));
        }
        if let Some(scaler) = &self.scaler
            && scaler
                .mean
                .iter()
                .chain(&scaler.scale)
                .any(|v| !v.is_finite())
        {
            return Err(ScoringError::Model("scaler values must be finite".into()));
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ScoringError::Model(format!("tree {t} has no nodes")));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                if let Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } = node
                {
                    let forward = |child: usize| child > i && child < tree.nodes.len();
                    if *feature >= FEATURES
                        || !threshold.is_finite()
                        || !forward(*left)
                        || !forward(*right)
                    {
                        return Err(ScoringError::Model(format!(
                            "tree {t} node {i} is malformed"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Raw anomaly score in `[-1, 0)`; lower is more anomalous.
    pub fn score_samples(&self, features: [f64; FEATURES]) -> f64 {
        let x = self.standardize(features);
        let total: f64 = self.trees.iter().map(|t| path_length(t, &x)).sum();
        let mean_depth = total / self.trees.len() as f64;
        -(2f64).powf(-mean_depth / average_path_length(self.max_samples))
    }

    /// Shifted score; negative means outlier.
    pub fn decision_function(&self, features: [f64; FEATURES]) -> f64 {
        self.score_samples(features) - self.offset
    }

    /// Label a vector. A raw score outside `[-1, 0)` is a model error, never
    /// a normal verdict.
    pub fn predict(&self, features: [f64; FEATURES]) -> Result<Prediction, ScoringError> {
        let raw = self.score_samples(features);
        if !(raw.is_finite() && (-1.0..0.0).contains(&raw)) {
            return Err(ScoringError::Model(format!(
                "score {raw} out of range for {features:?}"
            )));
        }
        let score = raw - self.offset;
        Ok(Prediction {
            label: if score < 0.0 { ANOMALY_LABEL } else { NORMAL_LABEL },
            score: Some(score),
        })
    }

    fn standardize(&self, features: [f64; FEATURES]) -> [f64; FEATURES] {
        let Some(scaler) = &self.scaler else {
            return features;
        };
        let mut out = features;
        for (i, v) in out.iter_mut().enumerate() {
            // Zero-variance features keep a unit scale.
            let scale = if scaler.scale[i] == 0.0 { 1.0 } else { scaler.scale[i] };
            *v = (*v - scaler.mean[i]) / scale;
        }
        out
    }
}

fn path_length(tree: &Tree, x: &[f64; FEATURES]) -> f64 {
    let mut idx = 0;
    let mut depth = 0u32;
    loop {
        match tree.nodes.get(idx) {
            Some(Node::Split {
                feature,
                threshold,
                left,
                right,
            }) => {
                idx = if x[*feature] <= *threshold { *left } else { *right };
                depth += 1;
            }
            Some(Node::Leaf { samples }) => {
                return f64::from(depth) + average_path_length(*samples);
            }
            // Unreachable for validated models.
            None => return f64::from(depth),
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: u64) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// [`ScoringBackend`] over a loaded [`IsolationForest`].
pub struct IsolationForestScorer {
    model: IsolationForest,
}

impl IsolationForestScorer {
    pub fn new(model: IsolationForest) -> Self {
        Self { model }
    }

    pub async fn load(path: &Path) -> Result<Self, ScoringError> {
        let model = IsolationForest::from_file(path).await?;
        info!(
            path = %path.display(),
            trees = model.trees.len(),
            max_samples = model.max_samples,
            "isolation forest loaded"
        );
        Ok(Self::new(model))
    }

    pub fn model(&self) -> &IsolationForest {
        &self.model
    }
}

impl ScoringBackend for IsolationForestScorer {
    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn invoke(&self, features: [f64; 3]) -> BoxFuture<'_, Result<Prediction, ScoringError>> {
        let prediction = self.model.predict(features);
        Box::pin(async move { prediction })
    }
}
