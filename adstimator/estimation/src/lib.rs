#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions, clippy::cast_precision_loss)]

//! Click-rate estimation for advertising creatives: campaign datasets, candidate generation,
//! classifier adapters and the evaluation harness that scores them.

/// Error taxonomy shared by every module.
#[path = "../error.rs"]
pub mod error;

/// Attribute schema and semantic roles.
#[path = "../schema.rs"]
pub mod schema;

/// Campaign datasets: records, rate conversion and matching.
#[path = "../dataset.rs"]
pub mod dataset;

/// Random train/validation splitting.
#[path = "../splitter.rs"]
pub mod splitter;

/// Enumeration of untested content combinations.
#[path = "../candidates.rs"]
pub mod candidates;

/// Estimator abstraction over pluggable classifiers.
#[path = "../estimator/main.rs"]
pub mod estimator;

/// Accuracy and ranking-strategy evaluation.
#[path = "../evaluation/main.rs"]
pub mod evaluation;

/// Evaluation configuration loading.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers for structured logging.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Candidate estimation pipeline.
#[path = "../pipeline.rs"]
pub mod pipeline;

pub use candidates::{CandidateSource, CombinationGenerator};
pub use config::{ClassifierSpec, EvaluationConfig};
pub use dataset::{Dataset, Record, RecordRef, Value};
pub use error::{EstimationError, Result};
pub use estimator::{
    build_estimator, Capabilities, Classifier, ClassifierRegistry, Estimator, EstimatorKind,
    NominalEstimator, NumericEstimator,
};
pub use evaluation::{
    AccuracyStats, ClassifierEvaluator, ErrorEvaluator, Evaluator, PerformanceEvaluator,
    StrategyEvaluator,
};
pub use pipeline::SuggestionPipeline;
pub use schema::{Attribute, AttributeKind, AttributeRole, AttributeSchema};
pub use splitter::DataSplitter;
pub use telemetry::{EstimationTelemetry, EstimationTelemetryBuilder};
