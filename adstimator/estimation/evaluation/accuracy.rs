use indexmap::IndexMap;
use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::{ensure_distinct, ClassifierSpec, EvaluationConfig},
    dataset::Dataset,
    error::{EstimationError, Result},
    estimator::{build_estimator, ClassifierRegistry},
    splitter::DataSplitter,
    telemetry::{emit, EstimationTelemetry, LogLevel},
};

use super::{real_rate, Evaluator};

/// Error tallies of one classifier across all trials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyStats {
    /// Validation records estimated and compared.
    pub compared: usize,
    /// Comparisons whose absolute error exceeded the tolerance.
    pub misses: usize,
    error_sum: f64,
    absolute_error_sum: f64,
    squared_error_sum: f64,
}

impl AccuracyStats {
    /// Adds one comparison.
    pub fn record(&mut self, estimate: f64, actual: f64, delta: f64) {
        let error = estimate - actual;
        self.compared += 1;
        if error.abs() > delta {
            self.misses += 1;
        }
        self.error_sum += error;
        self.absolute_error_sum += error.abs();
        self.squared_error_sum += error * error;
    }

    /// `1 - misses / compared`; 1.0 when nothing was compared.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.compared == 0 {
            return 1.0;
        }
        1.0 - self.misses as f64 / self.compared as f64
    }

    /// Signed mean of `estimate - actual`.
    #[must_use]
    pub fn mean_error(&self) -> f64 {
        self.mean(self.error_sum)
    }

    /// Mean of `|estimate - actual|`.
    #[must_use]
    pub fn mean_absolute_error(&self) -> f64 {
        self.mean(self.absolute_error_sum)
    }

    /// Mean of `(estimate - actual)^2`.
    #[must_use]
    pub fn mean_squared_error(&self) -> f64 {
        self.mean(self.squared_error_sum)
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.compared == 0 {
            0.0
        } else {
            sum / self.compared as f64
        }
    }
}

/// Measures how often each classifier estimates within `delta` of the real rate.
///
/// Each trial holds out a random share of the data (10% by default), strips its metrics and
/// estimates it with every classifier trained on a fresh copy of the remaining records. Results
/// are computed once and kept.
#[derive(Debug)]
pub struct ClassifierEvaluator<'a> {
    data: &'a Dataset,
    registry: &'a ClassifierRegistry,
    classifiers: Vec<ClassifierSpec>,
    runs: usize,
    delta: f64,
    validation_ratio: f64,
    rng: SmallRng,
    telemetry: Option<EstimationTelemetry>,
    results: Option<IndexMap<String, AccuracyStats>>,
}

impl<'a> ClassifierEvaluator<'a> {
    /// Evaluator over `data` with the default classifiers.
    pub fn new(
        data: &'a Dataset,
        registry: &'a ClassifierRegistry,
        runs: usize,
        delta: f64,
    ) -> Result<Self> {
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
        if delta.is_nan() || delta < 0.0 {
            return Err(EstimationError::InvalidArgument(format!(
                "delta must not be negative, got {delta}"
            )));
        }
        let defaults = EvaluationConfig::default();
        Ok(Self {
            data,
            registry,
            classifiers: defaults.classifiers,
            runs,
            delta,
            validation_ratio: defaults.validation_ratio,
            rng: SmallRng::from_entropy(),
            telemetry: None,
            results: None,
        })
    }

    /// Evaluator configured from `config`; the tolerance follows [`EvaluationConfig::delta_for`].
    pub fn from_config(
        data: &'a Dataset,
        registry: &'a ClassifierRegistry,
        config: &EvaluationConfig,
    ) -> Result<Self> {
        config.validate()?;
        let delta = config.delta_for(data)?;
        Ok(Self::new(data, registry, config.runs, delta)?
            .with_classifiers(config.classifiers.clone())
            .with_validation_ratio(config.validation_ratio)
            .with_rng(config.rng()))
    }

    /// Replaces the classifiers under evaluation.
    #[must_use]
    pub fn with_classifiers(mut self, classifiers: Vec<ClassifierSpec>) -> Self {
        self.classifiers = classifiers;
        self.results = None;
        self
    }

    /// Share of records held out per trial.
    #[must_use]
    pub fn with_validation_ratio(mut self, ratio: f64) -> Self {
        self.validation_ratio = ratio;
        self.results = None;
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

    /// Miss tolerance.
    #[must_use]
    pub const fn delta(&self) -> f64 {
        self.delta
    }

    /// Statistics per classifier, keyed by `name options...`.
    pub fn evaluate(&mut self) -> Result<&IndexMap<String, AccuracyStats>> {
        let results = match self.results.take() {
            Some(results) => results,
            None => self.run()?,
        };
        Ok(&*self.results.insert(results))
    }

    /// Success rate of the classifier with the given label.
    pub fn success_rate(&mut self, label: &str) -> Result<f64> {
        self.evaluate()?
            .get(label)
            .map(AccuracyStats::success_rate)
            .ok_or_else(|| EstimationError::UnknownClassifier(label.to_owned()))
    }

    fn run(&mut self) -> Result<IndexMap<String, AccuracyStats>> {
        ensure_distinct(&self.classifiers)?;
        let data = self.data;
        let mut stats: IndexMap<String, AccuracyStats> = self
            .classifiers
            .iter()
            .map(|spec| (spec.to_string(), AccuracyStats::default()))
            .collect();

        for trial in 1..=self.runs {
            let (held_out, training) =
                DataSplitter::with_rng(data, self.validation_ratio, &mut self.rng)?.into_parts();
            let validation = held_out.without_metrics()?;

            for spec in &self.classifiers {
                let classifier = self.registry.create(&spec.name, &spec.options)?;
                let estimator = build_estimator(training.clone(), classifier)?;
                let label = spec.to_string();
                let entry = stats.entry(label.clone()).or_default();
                for probe in validation.rows() {
                    let estimate = estimator.estimate(probe)?;
                    let actual = real_rate(data, probe)?;
                    entry.record(estimate, actual, self.delta);
                }
                emit(
                    self.telemetry.as_ref(),
                    LogLevel::Debug,
                    "estimator.trained",
                    || json!({ "trial": trial, "classifier": label, "training": training.len() }),
                );
            }

            emit(
                self.telemetry.as_ref(),
                LogLevel::Info,
                "evaluation.trial_complete",
                || json!({ "trial": trial, "runs": self.runs, "validation": validation.len() }),
            );
        }
        Ok(stats)
    }
}

impl Evaluator for ClassifierEvaluator<'_> {
    fn description(&self) -> String {
        "Evaluation of the accuracy of different classifiers".to_owned()
    }

    fn result(&mut self) -> Result<String> {
        let delta = self.delta;
        let mut report = String::new();
        for (label, stats) in self.evaluate()? {
            report.push_str(&format!(
                "{label}: {:.5} within {delta:.5} (mean error {:.6}, mse {:.8})\n",
                stats.success_rate(),
                stats.mean_error(),
                stats.mean_squared_error()
            ));
        }
        Ok(report)
    }
}
