//! Evaluation harness: repeated random trials that score estimators against known click rates.
//!
//! Every trial splits the historical data, trains on the larger part and compares estimates for the
//! held-out part with the real rates found through [`Dataset::find_match`]. A failing classifier
//! aborts the whole evaluation; trials are never skipped.

/// Estimation accuracy over repeated trials.
pub mod accuracy;
/// Timing of estimator construction on generated data.
pub mod performance;
/// Mean squared error between an estimated and a real dataset.
pub mod residuals;
/// Top-N selection strategy evaluation.
pub mod strategy;

use crate::{
    dataset::{Dataset, RecordRef},
    error::{EstimationError, Result},
    schema::AttributeRole,
};

pub use accuracy::{AccuracyStats, ClassifierEvaluator};
pub use performance::PerformanceEvaluator;
pub use residuals::ErrorEvaluator;
pub use strategy::StrategyEvaluator;

/// Evaluator producing a textual report.
pub trait Evaluator {
    /// What the evaluator measures.
    fn description(&self) -> String;

    /// Runs the evaluation if needed and renders its outcome.
    fn result(&mut self) -> Result<String>;
}

/// Real click rate of the record in `reference` whose content matches `probe`.
pub(crate) fn real_rate(reference: &Dataset, probe: RecordRef<'_>) -> Result<f64> {
    reference
        .find_match(probe)
        .ok_or_else(|| EstimationError::UnmatchedRecord(describe(probe)))?
        .rate()
}

/// Content attributes of `record` as `name=value` pairs.
pub(crate) fn describe(record: RecordRef<'_>) -> String {
    record
        .schema()
        .iter()
        .filter(|attribute| attribute.role() == AttributeRole::Content)
        .map(|attribute| {
            format!(
                "{}={}",
                attribute.name,
                record.display(&attribute.name).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::sample_ads;

    #[test]
    fn real_rate_comes_from_the_reference() {
        let ads = sample_ads();
        let validation = ads.without_metrics().unwrap();
        let rate = real_rate(&ads, validation.row(1).unwrap()).unwrap();
        assert!((rate - 0.07).abs() < 1e-12);
    }

    #[test]
    fn unmatched_records_name_their_content() {
        let ads = sample_ads();
        let mut probes = ads.empty_like();
        probes
            .push_text_row(&["M", "18", "23", "Text-2", "Image-3", "1", "10"])
            .unwrap();
        let err = real_rate(&ads, probes.row(0).unwrap()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no matching record found for Body=Text-2, Image Hash=Image-3"
        );
    }
}
