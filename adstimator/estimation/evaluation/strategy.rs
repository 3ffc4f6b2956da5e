use indexmap::IndexMap;
use rand::{rngs::SmallRng, SeedableRng};
use serde_json::json;

use crate::{
    config::{ensure_distinct, ClassifierSpec, EvaluationConfig},
    dataset::Dataset,
    error::{EstimationError, Result},
    estimator::{build_estimator, ClassifierRegistry},
    splitter::{split_size, DataSplitter},
    telemetry::{emit, EstimationTelemetry, LogLevel},
};

use super::real_rate;

/// Scores the policy "run the N creatives with the highest estimated rate".
///
/// For each trial the held-out records are ranked by estimate, highest first. Entry `n - 1` of a
/// classifier's result is the real rate of the top `n` records averaged over all trials, either as
/// a plain mean or weighted by each record's estimate. Equal estimates keep the order the split
/// produced.
#[derive(Debug)]
pub struct StrategyEvaluator<'a> {
    data: &'a Dataset,
    registry: &'a ClassifierRegistry,
    classifiers: Vec<ClassifierSpec>,
    runs: usize,
    validation_ratio: f64,
    rng: SmallRng,
    telemetry: Option<EstimationTelemetry>,
}

impl<'a> StrategyEvaluator<'a> {
    /// Evaluator over `data` with the default classifiers.
    pub fn new(data: &'a Dataset, registry: &'a ClassifierRegistry, runs: usize) -> Result<Self> {
        if runs == 0 {
            return Err(EstimationError::InvalidArgument(
                "at least one run is required".into(),
            ));
        }
        if data.is_empty() {
            return Err(EstimationError::InvalidArgument(
                "cannot evaluate on an empty data set".into(),
            ));
        }
        let defaults = EvaluationConfig::default();
        Ok(Self {
            data,
            registry,
            classifiers: defaults.classifiers,
            runs,
            validation_ratio: defaults.validation_ratio,
            rng: SmallRng::from_entropy(),
            telemetry: None,
        })
    }

    /// Evaluator configured from `config`.
    pub fn from_config(
        data: &'a Dataset,
        registry: &'a ClassifierRegistry,
        config: &EvaluationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(data, registry, config.runs)?
            .with_classifiers(config.classifiers.clone())
            .with_validation_ratio(config.validation_ratio)
            .with_rng(config.rng()))
    }

    /// Replaces the classifiers under evaluation.
    #[must_use]
    pub fn with_classifiers(mut self, classifiers: Vec<ClassifierSpec>) -> Self {
        self.classifiers = classifiers;
        self
    }

    /// Share of records held out per trial.
    #[must_use]
    pub fn with_validation_ratio(mut self, ratio: f64) -> Self {
        self.validation_ratio = ratio;
        self
    }

    /// Random source for the splits.
    #[must_use]
    pub fn with_rng(mut self, rng: SmallRng) -> Self {
        self.rng = rng;
        self
    }

    /// Telemetry handle for trial events.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EstimationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Average real rate of the top `1..=strategy` records per classifier.
    pub fn evaluate(
        &mut self,
        strategy: usize,
        weighted: bool,
    ) -> Result<IndexMap<String, Vec<f64>>> {
        ensure_distinct(&self.classifiers)?;
        let held_out = split_size(self.data.len(), self.validation_ratio);
        if strategy == 0 || strategy > held_out {
            return Err(EstimationError::InvalidArgument(format!(
                "strategy must lie within 1..={held_out} (validation records per trial), got {strategy}"
            )));
        }
        let data = self.data;
        let mut totals: IndexMap<String, Vec<f64>> = self
            .classifiers
            .iter()
            .map(|spec| (spec.to_string(), vec![0.0; strategy]))
            .collect();

        for trial in 1..=self.runs {
            let (held_out, training) =
                DataSplitter::with_rng(data, self.validation_ratio, &mut self.rng)?.into_parts();
            let real = held_out.to_rate()?;
            let validation = held_out.without_metrics()?;

            for spec in &self.classifiers {
                let classifier = self.registry.create(&spec.name, &spec.options)?;
                let estimator = build_estimator(training.clone(), classifier)?;
                let estimates = estimator.estimate_all(&validation)?;
                let mut ranked: Vec<_> = estimates.into_iter().zip(validation.rows()).collect();
                ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

                let sums = totals.entry(spec.to_string()).or_default();
                let mut real_sum = 0.0;
                let mut estimate_sum = 0.0;
                for (n, (estimate, probe)) in ranked.into_iter().take(strategy).enumerate() {
                    let rate = real_rate(&real, probe)?;
                    let average = if weighted {
                        estimate_sum += estimate;
                        real_sum += estimate * rate;
                        if estimate_sum == 0.0 {
                            return Err(EstimationError::Arithmetic(format!(
                                "{spec} estimated a total rate of zero for the top {} records",
                                n + 1
                            )));
                        }
                        real_sum / estimate_sum
                    } else {
                        real_sum += rate;
                        real_sum / (n + 1) as f64
                    };
                    sums[n] += average;
                }
            }

            emit(
                self.telemetry.as_ref(),
                LogLevel::Info,
                "evaluation.strategy_trial_complete",
                || json!({ "trial": trial, "runs": self.runs, "strategy": strategy, "weighted": weighted }),
            );
        }

        let runs = self.runs as f64;
        for sums in totals.values_mut() {
            for sum in sums.iter_mut() {
                *sum /= runs;
            }
        }
        Ok(totals)
    }
}
