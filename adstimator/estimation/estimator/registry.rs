use std::fmt;

use indexmap::IndexMap;

use crate::error::{EstimationError, Result};

use super::{
    builtin::{LinearRegression, LogisticRegression, NearestNeighbours, KNN, LINEAR, LOGISTIC},
    Classifier,
};

/// Builds a classifier from its option list.
pub type ClassifierConstructor =
    Box<dyn Fn(&[String]) -> anyhow::Result<Box<dyn Classifier>> + Send + Sync>;

/// Maps classifier names to constructors.
#[derive(Default)]
pub struct ClassifierRegistry {
    constructors: IndexMap<String, ClassifierConstructor>,
}

impl fmt::Debug for ClassifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierRegistry")
            .field("classifiers", &self.names())
            .finish()
    }
}

impl ClassifierRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `logistic`, `knn` and `linear`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LOGISTIC, |options| {
            Ok(Box::new(LogisticRegression::from_options(options)?))
        });
        registry.register(KNN, |options| {
            Ok(Box::new(NearestNeighbours::from_options(options)?))
        });
        registry.register(LINEAR, |options| {
            Ok(Box::new(LinearRegression::from_options(options)?))
        });
        registry
    }

    /// Adds or replaces the constructor for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&[String]) -> anyhow::Result<Box<dyn Classifier>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    /// Registered names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Fresh, untrained classifier called `name`.
    pub fn create(&self, name: &str, options: &[String]) -> Result<Box<dyn Classifier>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| EstimationError::UnknownClassifier(name.to_owned()))?;
        constructor(options).map_err(|err| EstimationError::Config(format!("{name}: {err:#}")))
    }
}
