use crate::{
    dataset::{counts, Dataset, RecordRef, Value},
    error::{EstimationError, Result},
    schema::{Attribute, AttributeRole, ACTION},
};

use super::{Classifier, Estimator, EstimatorKind};

const YES: &str = "yes";
const NO: &str = "no";

/// Estimator backed by a binary-outcome classifier.
///
/// Every knowledge record becomes two weighted `Action` records: `yes` weighted by clicks + 1 and
/// `no` weighted by non-clicks + 1. The estimate is the predicted probability of `yes`.
pub struct NominalEstimator {
    knowledge: Dataset,
    classifier: Box<dyn Classifier>,
    yes: usize,
}

impl NominalEstimator {
    /// Adapts `knowledge` and trains `classifier` on the result.
    pub fn new(knowledge: Dataset, mut classifier: Box<dyn Classifier>) -> Result<Self> {
        if !classifier.capabilities().nominal_class {
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
        let yes = knowledge
            .response()
            .and_then(|action| action.label_index(YES))
            .ok_or_else(|| EstimationError::Schema(format!("`{ACTION}` has no `{YES}` label")))?;
        Ok(Self {
            knowledge,
            classifier,
            yes,
        })
    }

    /// Rewrites click and impression counts into weighted `Action` records.
    ///
    /// Metric attributes are dropped. Data that already carries an `Action` attribute is returned
    /// with `Action` as its response.
    pub fn adapt(knowledge: &Dataset) -> Result<Dataset> {
        if let Some(action) = knowledge.schema().get(ACTION) {
            if action.label_index(YES).is_none() || action.label_index(NO).is_none() {
                return Err(EstimationError::Schema(format!(
                    "`{ACTION}` must be nominal with `{YES}` and `{NO}` labels"
                )));
            }
            return knowledge.clone().with_response(ACTION);
        }

        let (clicks_index, impressions_index) = knowledge.count_indices()?;
        let keep: Vec<usize> = knowledge
            .schema()
            .iter()
            .enumerate()
            .filter(|(_, attribute)| attribute.role() != AttributeRole::Metric)
            .map(|(index, _)| index)
            .collect();
        let projected = knowledge.project(&keep);
        let mut schema = projected.schema().clone();
        schema.push(Attribute::nominal(ACTION, [YES, NO]))?;

        let mut records = Vec::with_capacity(knowledge.len() * 2);
        let mut negatives = Vec::with_capacity(knowledge.len());
        for (original, kept) in knowledge.records().iter().zip(projected.records()) {
            let (clicks, impressions) =
                counts(knowledge.schema(), original, clicks_index, impressions_index)?;
            if clicks > impressions {
                return Err(EstimationError::InvalidArgument(format!(
                    "{clicks} clicks exceed {impressions} impressions"
                )));
            }
            records.push(
                kept.clone()
                    .appended(Value::Nominal(0))
                    .with_weight(clicks + 1.0),
            );
            negatives.push(
                kept.clone()
                    .appended(Value::Nominal(1))
                    .with_weight(impressions - clicks + 1.0),
            );
        }
        records.append(&mut negatives);
        let response = schema.len() - 1;
        Ok(Dataset::from_parts(
            knowledge.name(),
            schema,
            records,
            Some(response),
        ))
    }
}

impl Estimator for NominalEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Nominal
    }

    fn knowledge(&self) -> &Dataset {
        &self.knowledge
    }

    fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    fn estimate(&self, record: RecordRef<'_>) -> Result<f64> {
        let prediction = |source: anyhow::Error| EstimationError::Prediction {
            classifier: self.classifier.name().to_owned(),
            source,
        };
        let distribution = self
            .classifier
            .predict_distribution(record)
            .map_err(prediction)?;
        distribution.get(self.yes).copied().ok_or_else(|| {
            prediction(anyhow::anyhow!(
                "distribution has {} entries, expected `{YES}` at {}",
                distribution.len(),
                self.yes
            ))
        })
    }
}
