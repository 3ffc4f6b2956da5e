use thiserror::Error;

/// Result alias used across the estimation core.
pub type Result<T, E = EstimationError> = std::result::Result<T, E>;

/// Errors raised by datasets, estimators and evaluators.
#[derive(Debug, Error)]
pub enum EstimationError {
    /// A required attribute is malformed, or a record does not fit its schema.
    #[error("schema error: {0}")]
    Schema(String),
    /// Attributes needed by an operation could not be located.
    #[error("required attributes could not be found in data set: {}", .missing.join(", "))]
    MissingAttributes {
        /// Names of the attributes that were looked up.
        missing: Vec<String>,
    },
    /// An argument is out of its accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A rate could not be computed (zero impressions, empty input).
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    /// The classifier declares neither nominal nor numeric prediction support.
    #[error("classifier `{0}` supports neither nominal nor numeric class prediction")]
    UnsupportedClassifier(String),
    /// No classifier is registered under the requested name.
    #[error("unknown classifier `{0}`")]
    UnknownClassifier(String),
    /// The wrapped classifier failed while training.
    #[error("classifier `{classifier}` failed to train: {source}")]
    Training {
        /// Classifier name.
        classifier: String,
        /// Failure reported by the classifier.
        #[source]
        source: anyhow::Error,
    },
    /// The wrapped classifier failed while predicting.
    #[error("classifier `{classifier}` failed to predict: {source}")]
    Prediction {
        /// Classifier name.
        classifier: String,
        /// Failure reported by the classifier.
        #[source]
        source: anyhow::Error,
    },
    /// A validation record has no counterpart holding its real rate.
    #[error("no matching record found for {0}")]
    UnmatchedRecord(String),
    /// Configuration could not be read or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EstimationError {
    pub(crate) fn missing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MissingAttributes {
            missing: names.into_iter().map(Into::into).collect(),
        }
    }
}
