use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    error::{EstimationError, Result},
};

/// Classifier name plus its opaque option list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSpec {
    /// Registry name.
    pub name: String,
    /// Options passed through verbatim to the classifier constructor.
    #[serde(default)]
    pub options: Vec<String>,
}

impl ClassifierSpec {
    /// Creates a spec from a name and options.
    pub fn new<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            options: options.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ClassifierSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for option in &self.options {
            write!(f, " {option}")?;
        }
        Ok(())
    }
}

/// Parameters of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Number of random trials.
    #[serde(default = "default_runs")]
    pub runs: usize,
    /// Share of records held out for validation in each trial.
    #[serde(default = "default_validation_ratio")]
    pub validation_ratio: f64,
    /// Seed for the trial random source; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Absolute error above which an estimate counts as a miss.
    #[serde(default)]
    pub delta: Option<f64>,
    /// Miss tolerance relative to the average rate, used when `delta` is absent.
    #[serde(default = "default_relative_delta")]
    pub relative_delta: f64,
    /// Number of top-ranked records the strategy evaluator averages over.
    #[serde(default = "default_strategy")]
    pub strategy: usize,
    /// Weight strategy averages by predicted rate.
    #[serde(default)]
    pub weighted: bool,
    /// Classifiers under evaluation.
    #[serde(default = "default_classifiers")]
    pub classifiers: Vec<ClassifierSpec>,
    /// JSON log destination.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            runs: default_runs(),
            validation_ratio: default_validation_ratio(),
            seed: None,
            delta: None,
            relative_delta: default_relative_delta(),
            strategy: default_strategy(),
            weighted: false,
            classifiers: default_classifiers(),
            log_path: None,
        }
    }
}

impl EvaluationConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// A relative `log_path` is resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading evaluation config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        if let Some(log_path) = config.log_path.as_mut() {
            if log_path.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                *log_path = base.join(&*log_path);
            }
        }
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|err| EstimationError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            return Err(EstimationError::Config("runs must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.validation_ratio) {
            return Err(EstimationError::Config(format!(
                "validation_ratio must lie within [0, 1], got {}",
                self.validation_ratio
            )));
        }
        if let Some(delta) = self.delta {
            if delta < 0.0 {
                return Err(EstimationError::Config(format!(
                    "delta must not be negative, got {delta}"
                )));
            }
        }
        if self.relative_delta < 0.0 {
            return Err(EstimationError::Config(format!(
                "relative_delta must not be negative, got {}",
                self.relative_delta
            )));
        }
        if self.strategy == 0 {
            return Err(EstimationError::Config(
                "strategy must be greater than 0".into(),
            ));
        }
        if self.classifiers.is_empty() {
            return Err(EstimationError::Config(
                "at least one classifier is required".into(),
            ));
        }
        ensure_distinct(&self.classifiers)
    }

    /// Miss tolerance for `dataset`: `delta`, or `relative_delta` times its average rate.
    pub fn delta_for(&self, dataset: &Dataset) -> Result<f64> {
        match self.delta {
            Some(delta) => Ok(delta),
            None => Ok(self.relative_delta * dataset.average_rate()?),
        }
    }

    /// Random source for trials.
    #[must_use]
    pub fn rng(&self) -> SmallRng {
        self.seed
            .map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64)
    }
}

/// Rejects classifier lists naming the same configuration twice; results are keyed by label.
pub(crate) fn ensure_distinct(classifiers: &[ClassifierSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in classifiers {
        let label = spec.to_string();
        if !seen.insert(label.clone()) {
            return Err(EstimationError::Config(format!(
                "classifier `{label}` is listed more than once"
            )));
        }
    }
    Ok(())
}

const fn default_runs() -> usize {
    100
}

const fn default_validation_ratio() -> f64 {
    0.1
}

const fn default_relative_delta() -> f64 {
    0.2
}

const fn default_strategy() -> usize {
    3
}

fn default_classifiers() -> Vec<ClassifierSpec> {
    vec![
        ClassifierSpec::new("logistic", ["-R", "1000"]),
        ClassifierSpec::new("knn", Vec::<String>::new()),
        ClassifierSpec::new("linear", Vec::<String>::new()),
    ]
}
