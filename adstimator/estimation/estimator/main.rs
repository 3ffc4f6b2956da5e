//! Estimators turn a pluggable classifier into a single "estimate the click rate" contract.
//!
//! Two variants exist because classifiers come in two shapes: binary-outcome classifiers that
//! predict a class distribution, and regressors that predict a number. [`build_estimator`] picks the
//! variant from the capabilities the classifier declares.

/// Built-in reference classifiers.
pub mod builtin;
/// Record to feature-vector encoding shared by the built-in classifiers.
pub mod features;
/// Estimator for binary-outcome classifiers.
pub mod nominal;
/// Estimator for regressors.
pub mod numeric;
/// Name-based classifier construction.
pub mod registry;

use serde::{Deserialize, Serialize};

use crate::{
    dataset::{Dataset, RecordRef},
    error::{EstimationError, Result},
};

pub use nominal::NominalEstimator;
pub use numeric::NumericEstimator;
pub use registry::ClassifierRegistry;

/// Prediction capabilities a classifier declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Predicts a probability distribution over a nominal class.
    pub nominal_class: bool,
    /// Predicts a single numeric value.
    pub numeric_class: bool,
}

impl Capabilities {
    /// Nominal class support only.
    #[must_use]
    pub const fn nominal() -> Self {
        Self {
            nominal_class: true,
            numeric_class: false,
        }
    }

    /// Numeric class support only.
    #[must_use]
    pub const fn numeric() -> Self {
        Self {
            nominal_class: false,
            numeric_class: true,
        }
    }
}

/// Pluggable classification or regression algorithm.
///
/// The training dataset designates its response attribute and carries per-record weights.
/// Records passed to the prediction methods may come from a different schema; implementations
/// should look attributes up by name.
pub trait Classifier {
    /// Name used in reports and errors.
    fn name(&self) -> &str;

    /// Declared prediction support.
    fn capabilities(&self) -> Capabilities;

    /// Fits the classifier to `data`.
    fn train(&mut self, data: &Dataset) -> anyhow::Result<()>;

    /// Class probabilities, indexed like the response attribute's labels.
    fn predict_distribution(&self, record: RecordRef<'_>) -> anyhow::Result<Vec<f64>> {
        let _ = record;
        anyhow::bail!("{} does not predict class distributions", self.name())
    }

    /// Predicted numeric value.
    fn predict_value(&self, record: RecordRef<'_>) -> anyhow::Result<f64> {
        let _ = record;
        anyhow::bail!("{} does not predict numeric values", self.name())
    }
}

/// Variant an estimator was built as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// Wraps a binary-outcome classifier.
    Nominal,
    /// Wraps a regressor.
    Numeric,
}

/// Trained estimator of click rates.
///
/// Each estimator is built for one knowledge set; there is no way back to an untrained state.
pub trait Estimator {
    /// Variant of this estimator.
    fn kind(&self) -> EstimatorKind;

    /// Knowledge after adaptation, as the classifier saw it.
    fn knowledge(&self) -> &Dataset;

    /// Name of the wrapped classifier.
    fn classifier_name(&self) -> &str;

    /// Estimated click rate of `record`.
    fn estimate(&self, record: RecordRef<'_>) -> Result<f64>;

    /// Estimates for every row of `dataset`, in order.
    fn estimate_all(&self, dataset: &Dataset) -> Result<Vec<f64>> {
        dataset.rows().map(|row| self.estimate(row)).collect()
    }
}

/// Adapts `knowledge`, trains `classifier` on it and returns the matching estimator variant.
///
/// Numeric support wins when a classifier declares both.
pub fn build_estimator(
    knowledge: Dataset,
    classifier: Box<dyn Classifier>,
) -> Result<Box<dyn Estimator>> {
    let capabilities = classifier.capabilities();
    if capabilities.numeric_class {
        Ok(Box::new(NumericEstimator::new(knowledge, classifier)?))
    } else if capabilities.nominal_class {
        Ok(Box::new(NominalEstimator::new(knowledge, classifier)?))
    } else {
        Err(EstimationError::UnsupportedClassifier(
            classifier.name().to_owned(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::stubs::{Broken, Incapable, LookupClassifier};
    use super::*;
    use crate::dataset::fixtures::sample_ads;

    #[test]
    fn factory_picks_variant_from_capabilities() {
        let numeric = build_estimator(sample_ads(), Box::new(LookupClassifier::numeric())).unwrap();
        assert_eq!(numeric.kind(), EstimatorKind::Numeric);
        let nominal = build_estimator(sample_ads(), Box::new(LookupClassifier::nominal())).unwrap();
        assert_eq!(nominal.kind(), EstimatorKind::Nominal);

        let mut both = LookupClassifier::nominal();
        both.capabilities.numeric_class = true;
        let both = build_estimator(sample_ads(), Box::new(both)).unwrap();
        assert_eq!(both.kind(), EstimatorKind::Numeric);
    }

    #[test]
    fn factory_rejects_incapable_classifier() {
        let err = build_estimator(sample_ads(), Box::new(Incapable))
            .err()
            .unwrap();
        assert!(matches!(err, EstimationError::UnsupportedClassifier(name) if name == "incapable"));
    }

    #[test]
    fn training_failure_carries_classifier_name() {
        let err = build_estimator(sample_ads(), Box::new(Broken)).err().unwrap();
        match err {
            EstimationError::Training { classifier, source } => {
                assert_eq!(classifier, "broken");
                assert_eq!(source.to_string(), "singular matrix");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn default_predictions_are_errors() {
        let ads = sample_ads();
        let err = Incapable.predict_value(ads.row(0).unwrap()).unwrap_err();
        assert!(err.to_string().contains("does not predict numeric values"));
    }
}
