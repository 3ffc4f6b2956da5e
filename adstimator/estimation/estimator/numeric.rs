use crate::{
    dataset::{Dataset, RecordRef},
    error::{EstimationError, Result},
};

use super::{Classifier, Estimator, EstimatorKind};

/// Estimator backed by a regressor predicting `Click Rate` directly.
pub struct NumericEstimator {
    knowledge: Dataset,
    classifier: Box<dyn Classifier>,
}

impl NumericEstimator {
    /// Converts `knowledge` to rates and trains `classifier` on the result.
    pub fn new(knowledge: Dataset, mut classifier: Box<dyn Classifier>) -> Result<Self> {
        if !classifier.capabilities().numeric_class {
            return Err(EstimationError::UnsupportedClassifier(
                classifier.name().to_owned(),
            ));
        }
        let knowledge = Self::adapt(&knowledge)?;
        classifier
            .train(&knowledge)
            .map_err(|source| EstimationError::Training {
                classifier: classifier.name().to_owned(),
                source,
            })?;
        Ok(Self {
            knowledge,
            classifier,
        })
    }

    /// Knowledge with a `Click Rate` response.
    pub fn adapt(knowledge: &Dataset) -> Result<Dataset> {
        knowledge.to_rate()
    }
}

impl Estimator for NumericEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Numeric
    }

    fn knowledge(&self) -> &Dataset {
        &self.knowledge
    }

    fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    fn estimate(&self, record: RecordRef<'_>) -> Result<f64> {
        self.classifier
            .predict_value(record)
            .map_err(|source| EstimationError::Prediction {
                classifier: self.classifier.name().to_owned(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::sample_ads;
    use crate::estimator::stubs::LookupClassifier;
    use crate::schema::CLICK_RATE;

    #[test]
    fn trains_on_rates() {
        let ads = sample_ads();
        let estimator =
            NumericEstimator::new(ads.clone(), Box::new(LookupClassifier::numeric())).unwrap();
        assert_eq!(estimator.knowledge().response().unwrap().name, CLICK_RATE);
        let estimate = estimator.estimate(ads.row(2).unwrap()).unwrap();
        assert!((estimate - 0.05).abs() < 1e-12);
    }

    #[test]
    fn estimates_every_row_in_order() {
        let ads = sample_ads();
        let estimator =
            NumericEstimator::new(ads.clone(), Box::new(LookupClassifier::numeric())).unwrap();
        let estimates = estimator.estimate_all(&ads.without_metrics().unwrap()).unwrap();
        let expected = [0.05, 0.07, 0.05, 0.04];
        assert_eq!(estimates.len(), expected.len());
        for (actual, expected) in estimates.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_impressions_fail_adaptation() {
        let mut ads = sample_ads();
        ads.push_text_row(&["F", "18", "23", "Text-2", "Image-1", "0", "0"])
            .unwrap();
        let err = NumericEstimator::new(ads, Box::new(LookupClassifier::numeric()))
            .err()
            .unwrap();
        assert!(matches!(err, EstimationError::Arithmetic(_)));
    }
}
