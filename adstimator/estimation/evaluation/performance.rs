use std::time::{Duration, Instant};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{
    config::ClassifierSpec,
    dataset::{Dataset, Record, Value},
    error::{EstimationError, Result},
    estimator::{build_estimator, ClassifierRegistry},
    schema::{Attribute, AttributeSchema, BODY, CLICKS_COUNT, IMAGE_HASH, IMPRESSIONS},
};

use super::Evaluator;

const RATE_MEAN: f64 = 0.02;
const RATE_DEVIATION: f64 = 0.01;
const IMPRESSIONS_MEAN: f64 = 150_000.0;
const IMPRESSIONS_DEVIATION: f64 = 30_000.0;

/// Times estimator construction and estimation on a generated knowledge set.
///
/// The knowledge holds `values` bodies and `values` images. Every off-diagonal combination occurs
/// `occurrences` times with a normally distributed click rate; the `values` diagonal combinations
/// are left out and estimated.
#[derive(Debug)]
pub struct PerformanceEvaluator<'a> {
    registry: &'a ClassifierRegistry,
    classifier: ClassifierSpec,
    values: usize,
    occurrences: usize,
    rng: SmallRng,
    outcome: Option<(Duration, Dataset)>,
}

impl<'a> PerformanceEvaluator<'a> {
    /// Evaluator for `classifier` over a `values` × `values` content grid.
    pub fn new(
        registry: &'a ClassifierRegistry,
        classifier: ClassifierSpec,
        values: usize,
        occurrences: usize,
    ) -> Result<Self> {
        if values < 2 {
            return Err(EstimationError::InvalidArgument(format!(
                "at least two values per content attribute are required, got {values}"
            )));
        }
        if occurrences == 0 {
            return Err(EstimationError::InvalidArgument(
                "at least one occurrence per combination is required".into(),
            ));
        }
        Ok(Self {
            registry,
            classifier,
            values,
            occurrences,
            rng: SmallRng::from_entropy(),
            outcome: None,
        })
    }

    /// Random source for the generated knowledge.
    #[must_use]
    pub fn with_rng(mut self, rng: SmallRng) -> Self {
        self.rng = rng;
        self.outcome = None;
        self
    }

    /// Wall-clock time spent training and estimating.
    pub fn time(&mut self) -> Result<Duration> {
        Ok(self.outcome()?.0)
    }

    /// Diagonal combinations with their estimates in `Click Rate`.
    pub fn estimates(&mut self) -> Result<&Dataset> {
        Ok(&self.outcome()?.1)
    }

    fn outcome(&mut self) -> Result<&(Duration, Dataset)> {
        let outcome = match self.outcome.take() {
            Some(outcome) => outcome,
            None => self.run()?,
        };
        Ok(&*self.outcome.insert(outcome))
    }

    fn run(&mut self) -> Result<(Duration, Dataset)> {
        let (knowledge, probes) = generate(self.values, self.occurrences, &mut self.rng)?;
        let started = Instant::now();
        let classifier = self
            .registry
            .create(&self.classifier.name, &self.classifier.options)?;
        let estimator = build_estimator(knowledge, classifier)?;
        let estimates = estimator.estimate_all(&probes)?;
        let elapsed = started.elapsed();
        Ok((elapsed, probes.with_estimates(&estimates)?))
    }
}

impl Evaluator for PerformanceEvaluator<'_> {
    fn description(&self) -> String {
        "Evaluate the performance of an estimator by building the classifier from a large generated data set."
            .to_owned()
    }

    fn result(&mut self) -> Result<String> {
        Ok(format!(
            "Classifier was built and test data estimated in {:.4} seconds.",
            self.time()?.as_secs_f64()
        ))
    }
}

/// Generated knowledge (off-diagonal combinations) and probes (diagonal combinations).
fn generate<R: Rng>(values: usize, occurrences: usize, rng: &mut R) -> Result<(Dataset, Dataset)> {
    let rates = Normal::new(RATE_MEAN, RATE_DEVIATION)
        .map_err(|err| EstimationError::InvalidArgument(err.to_string()))?;
    let impressions = Normal::new(IMPRESSIONS_MEAN, IMPRESSIONS_DEVIATION)
        .map_err(|err| EstimationError::InvalidArgument(err.to_string()))?;

    let bodies: Vec<String> = (1..=values).map(|index| format!("Text-{index}")).collect();
    let images: Vec<String> = (1..=values).map(|index| format!("Image-{index}")).collect();
    let body = Attribute::nominal(BODY, bodies.iter().cloned());
    let image = Attribute::nominal(IMAGE_HASH, images.iter().cloned());

    let mut knowledge_records = Vec::with_capacity(values * (values - 1) * occurrences);
    let mut probe_records = Vec::with_capacity(values);
    for b in 0..values {
        for i in 0..values {
            if b == i {
                probe_records.push(Record::new(vec![Value::Nominal(b), Value::Nominal(i)]));
                continue;
            }
            for _ in 0..occurrences {
                let rate = rates.sample(rng).abs();
                let shown = impressions.sample(rng).round().max(0.0);
                // +1 keeps both counts positive
                let clicked = (rate * shown).round().min(shown) + 1.0;
                knowledge_records.push(Record::new(vec![
                    Value::Nominal(b),
                    Value::Nominal(i),
                    Value::Numeric(clicked),
                    Value::Numeric(shown + 1.0),
                ]));
            }
        }
    }

    let knowledge = Dataset::new(
        "Generated Training Data",
        AttributeSchema::new([
            body.clone(),
            image.clone(),
            Attribute::numeric(CLICKS_COUNT),
            Attribute::numeric(IMPRESSIONS),
        ])?,
        knowledge_records,
    )?;
    let probes = Dataset::new(
        "Generated Test Data",
        AttributeSchema::new([body, image])?,
        probe_records,
    )?;
    Ok((knowledge, probes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::stubs::LookupClassifier;
    use crate::schema::CLICK_RATE;

    #[test]
    fn generated_grid_leaves_out_the_diagonal() {
        let mut rng = SmallRng::seed_from_u64(1);
        let (knowledge, probes) = generate(4, 3, &mut rng).unwrap();
        assert_eq!(knowledge.len(), 4 * 3 * 3);
        assert_eq!(probes.len(), 4);
        assert_eq!(probes.column_names(), vec![BODY, IMAGE_HASH, CLICK_RATE]);
        for row in probes.rows() {
            assert_eq!(
                row.label(BODY).unwrap().trim_start_matches("Text-"),
                row.label(IMAGE_HASH).unwrap().trim_start_matches("Image-")
            );
            assert!(knowledge.find_match(row).is_none());
        }
        for row in knowledge.rows() {
            let clicks = row.numeric(CLICKS_COUNT).unwrap();
            let shown = row.numeric(IMPRESSIONS).unwrap();
            assert!(clicks >= 1.0 && clicks <= shown);
        }
        let average = knowledge.average_rate().unwrap();
        assert!(average > 0.005 && average < 0.05, "{average}");
    }

    #[test]
    fn estimates_every_diagonal_combination() {
        let mut registry = ClassifierRegistry::new();
        registry.register("lookup", |_| {
            let mut classifier = LookupClassifier::numeric();
            classifier.fallback = 0.5;
            Ok(Box::new(classifier))
        });
        let mut evaluator = PerformanceEvaluator::new(
            &registry,
            ClassifierSpec::new("lookup", Vec::<String>::new()),
            3,
            2,
        )
        .unwrap()
        .with_rng(SmallRng::seed_from_u64(9));
        let estimates = evaluator.estimates().unwrap();
        assert_eq!(estimates.len(), 3);
        assert!(estimates
            .rows()
            .all(|row| (row.numeric(CLICK_RATE).unwrap() - 0.5).abs() < 1e-12));
        let first = evaluator.time().unwrap();
        assert_eq!(evaluator.time().unwrap(), first);
        assert!(evaluator.result().unwrap().starts_with("Classifier was built"));
    }

    #[test]
    fn rejects_degenerate_grids() {
        let registry = ClassifierRegistry::with_builtins();
        let spec = ClassifierSpec::new("knn", Vec::<String>::new());
        assert!(PerformanceEvaluator::new(&registry, spec.clone(), 1, 5).is_err());
        assert!(PerformanceEvaluator::new(&registry, spec, 5, 0).is_err());
    }

    #[test]
    fn unknown_classifier_surfaces_on_first_use() {
        let registry = ClassifierRegistry::with_builtins();
        let mut evaluator = PerformanceEvaluator::new(
            &registry,
            ClassifierSpec::new("svm", Vec::<String>::new()),
            2,
            1,
        )
        .unwrap();
        assert!(matches!(
            evaluator.time().unwrap_err(),
            EstimationError::UnknownClassifier(_)
        ));
    }
}
