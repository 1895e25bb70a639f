//! Linear softmax policy over the action variants.
//!
//! One dense layer maps the feature vector to a logit per [`ActionKind`];
//! softmax turns logits into a distribution and the policy plays its mode.
//! Weights come from an external trainer as JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ActionKind, FEATURE_WIDTH, FeatureSnapshot, PolicyAction, TradePolicy};
use crate::domain::error::{PolicyError, TraderError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyModel {
    /// One row of `FEATURE_WIDTH` weights per action, in `ActionKind::ALL` order.
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
    pub limit_delta: f64,
    pub stop_delta: f64,
    #[serde(default)]
    pub forecast_pct: Option<f64>,
}

impl PolicyModel {
    fn validate(&self) -> Result<(), PolicyError> {
        let actions = ActionKind::ALL.len();
        let invalid = |reason: String| PolicyError::InvalidModel { reason };

        if self.weights.len() != actions || self.biases.len() != actions {
            return Err(invalid(format!(
                "expected {} weight rows and biases, got {} and {}",
                actions,
                self.weights.len(),
                self.biases.len()
            )));
        }
        if let Some(row) = self.weights.iter().find(|r| r.len() != FEATURE_WIDTH) {
            return Err(invalid(format!(
                "expected {} weights per row, got {}",
                FEATURE_WIDTH,
                row.len()
            )));
        }
        let finite = self
            .weights
            .iter()
            .flatten()
            .chain(self.biases.iter())
            .all(|w| w.is_finite());
        if !finite {
            return Err(invalid("non-finite weight".into()));
        }
        if self.limit_delta <= 0.0 || self.stop_delta <= 0.0 {
            return Err(invalid("deltas must be positive".into()));
        }
        if let Some(f) = self.forecast_pct {
            if !(f.is_finite() && f > 0.0) {
                return Err(invalid("forecast_pct must be positive".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LinearSoftmaxPolicy {
    model: PolicyModel,
}

impl LinearSoftmaxPolicy {
    pub fn new(model: PolicyModel) -> Result<Self, PolicyError> {
        model.validate()?;
        Ok(Self { model })
    }

    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let model: PolicyModel =
            serde_json::from_str(json).map_err(|e| PolicyError::InvalidModel {
                reason: e.to_string(),
            })?;
        Self::new(model)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TraderError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    pub fn model(&self) -> &PolicyModel {
        &self.model
    }

    /// Probability per action, in `ActionKind::ALL` order.
    pub fn action_distribution(
        &self,
        snapshot: &FeatureSnapshot,
    ) -> Result<Vec<(ActionKind, f64)>, PolicyError> {
        let input = snapshot.to_vector();
        let logits: Vec<f64> = self
            .model
            .weights
            .iter()
            .zip(&self.model.biases)
            .map(|(row, bias)| bias + row.iter().zip(&input).map(|(w, x)| w * x).sum::<f64>())
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(PolicyError::Failed {
                reason: "model produced non-finite logits".into(),
            });
        }
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        Ok(ActionKind::ALL
            .iter()
            .copied()
            .zip(exps.iter().map(|e| e / total))
            .collect())
    }
}

impl TradePolicy for LinearSoftmaxPolicy {
    fn name(&self) -> &str {
        "linear_softmax"
    }

    fn select_action(&self, snapshot: &FeatureSnapshot) -> Result<PolicyAction, PolicyError> {
        let distribution = self.action_distribution(snapshot)?;
        // first maximum wins, so ties resolve to the lowest action index
        let (kind, _) = distribution
            .iter()
            .fold(None, |best: Option<(ActionKind, f64)>, &(kind, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((kind, p)),
            })
            .unwrap_or((ActionKind::Wait, 1.0));
        Ok(kind.with_deltas(self.model.limit_delta, self.model.stop_delta))
    }

    fn forecast_on_entry(&self, _snapshot: &FeatureSnapshot) -> Option<f64> {
        self.model.forecast_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::test_support::snapshot;

    fn zero_model() -> PolicyModel {
        PolicyModel {
            weights: vec![vec![0.0; FEATURE_WIDTH]; ActionKind::ALL.len()],
            biases: vec![0.0; ActionKind::ALL.len()],
            limit_delta: 0.01,
            stop_delta: 0.005,
            forecast_pct: None,
        }
    }

    #[test]
    fn uniform_model_waits() {
        let policy = LinearSoftmaxPolicy::new(zero_model()).unwrap();
        let dist = policy.action_distribution(&snapshot()).unwrap();
        assert_eq!(dist.len(), 6);
        for (_, p) in &dist {
            assert!((p - 1.0 / 6.0).abs() < 1e-12);
        }
        assert_eq!(policy.select_action(&snapshot()), Ok(PolicyAction::Wait));
    }

    #[test]
    fn sells_when_unrealized_weight_dominates() {
        let mut model = zero_model();
        model.weights[1][0] = 2.0;
        let policy = LinearSoftmaxPolicy::new(model).unwrap();

        let mut s = snapshot();
        s.unrealized_pct = 3.0;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Sell));
        s.unrealized_pct = -3.0;
        assert_eq!(policy.select_action(&s), Ok(PolicyAction::Wait));
    }

    #[test]
    fn carries_model_deltas() {
        let mut model = zero_model();
        model.biases[4] = 1.0;
        let policy = LinearSoftmaxPolicy::new(model).unwrap();
        assert_eq!(
            policy.select_action(&snapshot()),
            Ok(PolicyAction::StopLossUp(0.005))
        );
    }

    #[test]
    fn distribution_sums_to_one() {
        let mut model = zero_model();
        model.weights[2][4] = 0.3;
        model.biases[3] = -1.2;
        let policy = LinearSoftmaxPolicy::new(model).unwrap();
        let total: f64 = policy
            .action_distribution(&snapshot())
            .unwrap()
            .iter()
            .map(|(_, p)| p)
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_wrong_shape() {
        let mut model = zero_model();
        model.weights[0].pop();
        assert!(matches!(
            LinearSoftmaxPolicy::new(model),
            Err(PolicyError::InvalidModel { .. })
        ));
        let mut model = zero_model();
        model.biases.push(0.0);
        assert!(LinearSoftmaxPolicy::new(model).is_err());
    }

    #[test]
    fn loads_from_json() {
        let json = serde_json::to_string(&PolicyModel {
            forecast_pct: Some(0.12),
            ..zero_model()
        })
        .unwrap();
        let policy = LinearSoftmaxPolicy::from_json(&json).unwrap();
        assert_eq!(policy.forecast_on_entry(&snapshot()), Some(0.12));
        assert!(LinearSoftmaxPolicy::from_json("{\"weights\": []}").is_err());
    }
}
