use crate::{
    dataset::Dataset,
    error::{EstimationError, Result},
};

use super::{real_rate, Evaluator};

/// Mean squared error of an estimated dataset against real outcomes.
///
/// The estimated dataset carries its estimates in its response attribute; each row is paired with
/// the real record of the same content.
#[derive(Debug)]
pub struct ErrorEvaluator<'a> {
    estimated: &'a Dataset,
    real: Dataset,
}

impl<'a> ErrorEvaluator<'a> {
    /// Pairs `estimated` with the `real` outcomes, converted to rates.
    pub fn new(estimated: &'a Dataset, real: &Dataset) -> Result<Self> {
        if estimated.response().is_none() {
            return Err(EstimationError::Schema(format!(
                "estimated data set `{}` has no response attribute",
                estimated.name()
            )));
        }
        Ok(Self {
            estimated,
            real: real.to_rate()?,
        })
    }

    /// Mean of `(estimate - real)^2` over every estimated row.
    pub fn mean_squared_error(&self) -> Result<f64> {
        let response = self
            .estimated
            .response()
            .map(|attribute| attribute.name.as_str())
            .unwrap_or_default();
        if self.estimated.is_empty() {
            return Err(EstimationError::Arithmetic(
                "mean squared error of an empty data set".into(),
            ));
        }
        let mut total = 0.0;
        for row in self.estimated.rows() {
            let estimate = row.numeric(response).ok_or_else(|| {
                EstimationError::Schema(format!("estimated row has no `{response}` value"))
            })?;
            let real = real_rate(&self.real, row)?;
            total += (estimate - real).powi(2);
        }
        Ok(total / self.estimated.len() as f64)
    }
}

impl Evaluator for ErrorEvaluator<'_> {
    fn description(&self) -> String {
        "Evaluate the mean squared error of instances in two data sets.".to_owned()
    }

    fn result(&mut self) -> Result<String> {
        Ok(format!(
            "Mean squared error is {:.6} for data set.",
            self.mean_squared_error()?
        ))
    }
}
