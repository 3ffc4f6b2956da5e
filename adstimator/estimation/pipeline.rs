use serde_json::json;

use crate::{
    candidates::{CandidateSource, CombinationGenerator},
    dataset::Dataset,
    error::Result,
    estimator::{build_estimator, Classifier},
    telemetry::{emit, EstimationTelemetry, LogLevel},
};

/// Estimates every untested content combination of a knowledge set.
#[derive(Debug, Default, Clone)]
pub struct SuggestionPipeline {
    telemetry: Option<EstimationTelemetry>,
}

impl SuggestionPipeline {
    /// Pipeline without telemetry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Telemetry handle for pipeline events.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EstimationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Candidates of `knowledge` with their estimates in a `Click Rate` response, best first.
    ///
    /// The estimator is trained on a copy of `knowledge`. Candidates with equal estimates keep
    /// their enumeration order.
    pub fn run(&self, knowledge: &Dataset, classifier: Box<dyn Classifier>) -> Result<Dataset> {
        let generator = CombinationGenerator::new(knowledge);
        let candidates = generator.all();
        emit(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "pipeline.candidates_generated",
            || json!({ "knowledge": knowledge.len(), "candidates": candidates.len() }),
        );

        let estimator = build_estimator(knowledge.clone(), classifier)?;
        emit(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "estimator.trained",
            || json!({ "classifier": estimator.classifier_name(), "kind": estimator.kind() }),
        );
        let estimates = estimator.estimate_all(candidates)?;

        let estimated = candidates.with_estimates(&estimates)?;
        let mut ranked: Vec<_> = estimates
            .into_iter()
            .zip(estimated.records().iter().cloned())
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(estimated.with_records(ranked.into_iter().map(|(_, record)| record).collect()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shared_logging::MemoryLogger;

    use super::*;
    use crate::dataset::fixtures::sample_ads;
    use crate::estimator::stubs::{Incapable, LookupClassifier};
    use crate::schema::{BODY, CLICK_RATE, IMAGE_HASH};

    /// Estimates a fixed rate per image label.
    struct ByImage;

    impl Classifier for ByImage {
        fn name(&self) -> &str {
            "by-image"
        }

        fn capabilities(&self) -> crate::estimator::Capabilities {
            crate::estimator::Capabilities::numeric()
        }

        fn train(&mut self, _data: &Dataset) -> anyhow::Result<()> {
            Ok(())
        }

        fn predict_value(&self, record: crate::dataset::RecordRef<'_>) -> anyhow::Result<f64> {
            Ok(match record.label(IMAGE_HASH) {
                Some("Image-3") => 0.09,
                Some("Image-1") => 0.02,
                _ => 0.05,
            })
        }
    }

    #[test]
    fn candidates_come_back_ranked() {
        let suggestions = SuggestionPipeline::new()
            .run(&sample_ads(), Box::new(ByImage))
            .unwrap();
        assert_eq!(suggestions.column_names(), vec![BODY, IMAGE_HASH, CLICK_RATE]);
        assert_eq!(suggestions.response().unwrap().name, CLICK_RATE);
        let ranked: Vec<(String, f64)> = suggestions
            .rows()
            .map(|row| {
                (
                    row.display(IMAGE_HASH).unwrap(),
                    row.numeric(CLICK_RATE).unwrap(),
                )
            })
            .collect();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "Image-3");
        assert_eq!(ranked[1].0, "Image-1");
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn equal_estimates_keep_enumeration_order() {
        let mut classifier = LookupClassifier::numeric();
        classifier.fallback = 0.03;
        let suggestions = SuggestionPipeline::new()
            .run(&sample_ads(), Box::new(classifier))
            .unwrap();
        let images: Vec<String> = suggestions
            .rows()
            .map(|row| row.display(IMAGE_HASH).unwrap())
            .collect();
        assert_eq!(images, vec!["Image-1", "Image-3"]);
    }

    #[test]
    fn knowledge_is_left_untouched() {
        let ads = sample_ads();
        let before = ads.clone();
        SuggestionPipeline::new()
            .run(&ads, Box::new(LookupClassifier::nominal()))
            .unwrap();
        assert_eq!(ads, before);
    }

    #[test]
    fn reports_candidate_count() {
        let sink = Arc::new(MemoryLogger::new());
        let telemetry = EstimationTelemetry::builder("pipeline")
            .sink(sink.clone())
            .build()
            .unwrap();
        SuggestionPipeline::new()
            .with_telemetry(telemetry)
            .run(&sample_ads(), Box::new(ByImage))
            .unwrap();
        let records = sink.snapshot();
        assert_eq!(records[0].message, "pipeline.candidates_generated");
        assert_eq!(records[0].metadata["candidates"], 2);
        assert_eq!(sink.messages()[1], "estimator.trained");
    }

    #[test]
    fn incapable_classifier_fails() {
        assert!(SuggestionPipeline::new()
            .run(&sample_ads(), Box::new(Incapable))
            .is_err());
    }
}
