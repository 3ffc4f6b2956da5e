use std::{collections::HashMap, str::FromStr};

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, RecordRef, Value};

use super::{features::FeatureEncoder, Capabilities, Classifier};

/// Registry name of [`LogisticRegression`].
pub const LOGISTIC: &str = "logistic";
/// Registry name of [`NearestNeighbours`].
pub const KNN: &str = "knn";
/// Registry name of [`LinearRegression`].
pub const LINEAR: &str = "linear";

/// Flag/value pairs like `-R 1000 -I 200`.
#[derive(Debug, Default)]
struct ClassifierOptions {
    values: HashMap<String, String>,
}

impl ClassifierOptions {
    fn parse(classifier: &str, options: &[String], accepted: &[&str]) -> anyhow::Result<Self> {
        let mut values = HashMap::new();
        let mut iter = options.iter();
        while let Some(flag) = iter.next() {
            if !accepted.contains(&flag.as_str()) {
                bail!(
                    "{classifier} does not accept option `{flag}` (accepted: {})",
                    accepted.join(" ")
                );
            }
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("option `{flag}` of {classifier} needs a value"))?;
            values.insert(flag.clone(), value.clone());
        }
        Ok(Self { values })
    }

    fn get<T>(&self, flag: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.values.get(flag).map_or(Ok(default), |raw| {
            raw.parse()
                .with_context(|| format!("invalid value `{raw}` for option `{flag}`"))
        })
    }
}

/// Weights and bias over encoded features.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearModel {
    encoder: FeatureEncoder,
    weights: Vec<f64>,
    bias: f64,
}

impl LinearModel {
    fn score(&self, features: &[f64]) -> f64 {
        features
            .iter()
            .zip(&self.weights)
            .map(|(feature, weight)| feature * weight)
            .sum::<f64>()
            + self.bias
    }
}

/// Weighted training sample.
struct Sample {
    features: Vec<f64>,
    target: f64,
    weight: f64,
}

fn samples(
    data: &Dataset,
    encoder: &FeatureEncoder,
    target: impl Fn(Value) -> Option<f64>,
) -> anyhow::Result<(Vec<Sample>, f64)> {
    let response = data
        .response_index()
        .ok_or_else(|| anyhow!("training data has no response attribute"))?;
    let samples: Vec<Sample> = data
        .rows()
        .filter_map(|row| {
            let target = target(row.record().value(response))?;
            Some(Sample {
                features: encoder.encode(row),
                target,
                weight: row.weight(),
            })
        })
        .collect();
    let total_weight: f64 = samples.iter().map(|sample| sample.weight).sum();
    if samples.is_empty() || total_weight <= 0.0 {
        bail!("training data has no usable records");
    }
    Ok((samples, total_weight))
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

/// Binary logistic regression trained by weighted full-batch gradient descent.
///
/// Options: `-R` ridge penalty (default `1e-8`), `-I` iterations (default 300), `-L` learning rate
/// (default 0.5). The ridge penalty applies to the weight-summed log-likelihood, so it stays
/// comparable across knowledge sets of different sizes.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    ridge: f64,
    iterations: usize,
    learning_rate: f64,
    model: Option<LinearModel>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            ridge: 1e-8,
            iterations: 300,
            learning_rate: 0.5,
            model: None,
        }
    }
}

impl LogisticRegression {
    /// Builds the classifier from command-line style options.
    pub fn from_options(options: &[String]) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let options = ClassifierOptions::parse(LOGISTIC, options, &["-R", "-I", "-L"])?;
        let ridge: f64 = options.get("-R", defaults.ridge)?;
        if ridge < 0.0 {
            bail!("ridge must not be negative, got {ridge}");
        }
        Ok(Self {
            ridge,
            iterations: options.get("-I", defaults.iterations)?,
            learning_rate: options.get("-L", defaults.learning_rate)?,
            model: None,
        })
    }

    fn model(&self) -> anyhow::Result<&LinearModel> {
        self.model
            .as_ref()
            .ok_or_else(|| anyhow!("{LOGISTIC} has not been trained"))
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &str {
        LOGISTIC
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::nominal()
    }

    fn train(&mut self, data: &Dataset) -> anyhow::Result<()> {
        let response = data
            .response()
            .ok_or_else(|| anyhow!("training data has no response attribute"))?;
        if response.labels().len() != 2 {
            bail!(
                "{LOGISTIC} needs a two-valued nominal response, `{}` has {} labels",
                response.name,
                response.labels().len()
            );
        }
        let encoder = FeatureEncoder::fit(data);
        let (samples, total_weight) = samples(data, &encoder, |value| {
            value
                .as_nominal()
                .map(|class| if class == 0 { 1.0 } else { 0.0 })
        })?;

        let prior = (samples
            .iter()
            .map(|sample| sample.weight * sample.target)
            .sum::<f64>()
            / total_weight)
            .clamp(1e-6, 1.0 - 1e-6);
        let mut weights = vec![0.0; encoder.width()];
        let mut bias = (prior / (1.0 - prior)).ln();
        for _ in 0..self.iterations {
            let mut gradient = vec![0.0; weights.len()];
            let mut bias_gradient = 0.0;
            for sample in &samples {
                let linear = sample
                    .features
                    .iter()
                    .zip(&weights)
                    .map(|(feature, weight)| feature * weight)
                    .sum::<f64>()
                    + bias;
                let error = (sigmoid(linear) - sample.target) * sample.weight;
                for (slot, feature) in gradient.iter_mut().zip(&sample.features) {
                    *slot += error * feature;
                }
                bias_gradient += error;
            }
            for (weight, slot) in weights.iter_mut().zip(&gradient) {
                *weight -= self.learning_rate * (slot + 2.0 * self.ridge * *weight) / total_weight;
            }
            bias -= self.learning_rate * bias_gradient / total_weight;
        }
        self.model = Some(LinearModel {
            encoder,
            weights,
            bias,
        });
        Ok(())
    }

    fn predict_distribution(&self, record: RecordRef<'_>) -> anyhow::Result<Vec<f64>> {
        let model = self.model()?;
        let first = sigmoid(model.score(&model.encoder.encode(record)));
        Ok(vec![first, 1.0 - first])
    }
}

/// Least-squares linear regression trained by weighted full-batch gradient descent.
///
/// Options: `-I` iterations (default 500), `-L` learning rate (default 0.1).
#[derive(Debug, Clone)]
pub struct LinearRegression {
    iterations: usize,
    learning_rate: f64,
    model: Option<LinearModel>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self {
            iterations: 500,
            learning_rate: 0.1,
            model: None,
        }
    }
}

impl LinearRegression {
    /// Builds the regressor from command-line style options.
    pub fn from_options(options: &[String]) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let options = ClassifierOptions::parse(LINEAR, options, &["-I", "-L"])?;
        Ok(Self {
            iterations: options.get("-I", defaults.iterations)?,
            learning_rate: options.get("-L", defaults.learning_rate)?,
            model: None,
        })
    }
}

impl Classifier for LinearRegression {
    fn name(&self) -> &str {
        LINEAR
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::numeric()
    }

    fn train(&mut self, data: &Dataset) -> anyhow::Result<()> {
        let encoder = FeatureEncoder::fit(data);
        let (samples, total_weight) = samples(data, &encoder, Value::as_numeric)?;
        let mut weights = vec![0.0; encoder.width()];
        let mut bias = samples
            .iter()
            .map(|sample| sample.weight * sample.target)
            .sum::<f64>()
            / total_weight;
        for _ in 0..self.iterations {
            let mut gradient = vec![0.0; weights.len()];
            let mut bias_gradient = 0.0;
            for sample in &samples {
                let prediction = sample
                    .features
                    .iter()
                    .zip(&weights)
                    .map(|(feature, weight)| feature * weight)
                    .sum::<f64>()
                    + bias;
                let error = (prediction - sample.target) * sample.weight;
                for (slot, feature) in gradient.iter_mut().zip(&sample.features) {
                    *slot += error * feature;
                }
                bias_gradient += error;
            }
            for (weight, slot) in weights.iter_mut().zip(&gradient) {
                *weight -= self.learning_rate * slot / total_weight;
            }
            bias -= self.learning_rate * bias_gradient / total_weight;
        }
        self.model = Some(LinearModel {
            encoder,
            weights,
            bias,
        });
        Ok(())
    }

    fn predict_value(&self, record: RecordRef<'_>) -> anyhow::Result<f64> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("{LINEAR} has not been trained"))?;
        Ok(model.score(&model.encoder.encode(record)))
    }
}

/// k-nearest-neighbour regression over encoded features.
///
/// Options: `-K` neighbours (default 1). The estimate is the mean response of the `k` closest
/// training records by Euclidean distance; ties keep training order.
#[derive(Debug, Clone)]
pub struct NearestNeighbours {
    k: usize,
    encoder: FeatureEncoder,
    memory: Vec<(Vec<f64>, f64)>,
}

impl Default for NearestNeighbours {
    fn default() -> Self {
        Self {
            k: 1,
            encoder: FeatureEncoder::default(),
            memory: Vec::new(),
        }
    }
}

impl NearestNeighbours {
    /// Builds the regressor from command-line style options.
    pub fn from_options(options: &[String]) -> anyhow::Result<Self> {
        let options = ClassifierOptions::parse(KNN, options, &["-K"])?;
        let k: usize = options.get("-K", 1)?;
        if k == 0 {
            bail!("{KNN} needs at least one neighbour");
        }
        Ok(Self {
            k,
            ..Self::default()
        })
    }
}

impl Classifier for NearestNeighbours {
    fn name(&self) -> &str {
        KNN
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::numeric()
    }

    fn train(&mut self, data: &Dataset) -> anyhow::Result<()> {
        let encoder = FeatureEncoder::fit(data);
        let (samples, _) = samples(data, &encoder, Value::as_numeric)?;
        self.memory = samples
            .into_iter()
            .map(|sample| (sample.features, sample.target))
            .collect();
        self.encoder = encoder;
        Ok(())
    }

    fn predict_value(&self, record: RecordRef<'_>) -> anyhow::Result<f64> {
        if self.memory.is_empty() {
            bail!("{KNN} has not been trained");
        }
        let probe = self.encoder.encode(record);
        let mut distances: Vec<(f64, f64)> = self
            .memory
            .iter()
            .map(|(features, target)| {
                let distance = features
                    .iter()
                    .zip(&probe)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>();
                (distance, *target)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));
        let nearest = &distances[..self.k.min(distances.len())];
        Ok(nearest.iter().map(|(_, target)| target).sum::<f64>() / nearest.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::sample_ads;
    use crate::estimator::NominalEstimator;
    use crate::schema::{Attribute, AttributeSchema, AGE_MIN, BODY, CLICK_RATE};

    fn options(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn option_parsing_rejects_bad_input() {
        assert!(LogisticRegression::from_options(&options(&["-R", "1000"])).is_ok());
        let unknown = LogisticRegression::from_options(&options(&["-Q", "1"])).unwrap_err();
        assert!(unknown.to_string().contains("does not accept option `-Q`"));
        let dangling = NearestNeighbours::from_options(&options(&["-K"])).unwrap_err();
        assert!(dangling.to_string().contains("needs a value"));
        assert!(NearestNeighbours::from_options(&options(&["-K", "two"])).is_err());
        assert!(NearestNeighbours::from_options(&options(&["-K", "0"])).is_err());
        assert!(LinearRegression::from_options(&options(&["-R", "1"])).is_err());
    }

    #[test]
    fn single_neighbour_recalls_training_rates() {
        let ads = sample_ads();
        let mut knn = NearestNeighbours::default();
        knn.train(&ads.to_rate().unwrap()).unwrap();
        for (row, expected) in ads.rows().zip([0.05, 0.07, 0.05, 0.04]) {
            assert!((knn.predict_value(row).unwrap() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn neighbours_average_their_rates() {
        let ads = sample_ads();
        let mut knn = NearestNeighbours::from_options(&options(&["-K", "4"])).unwrap();
        knn.train(&ads.to_rate().unwrap()).unwrap();
        let estimate = knn.predict_value(ads.row(0).unwrap()).unwrap();
        assert!((estimate - 0.0525).abs() < 1e-12);
    }

    #[test]
    fn untrained_classifiers_refuse_to_predict() {
        let ads = sample_ads();
        let row = ads.row(0).unwrap();
        assert!(NearestNeighbours::default().predict_value(row).is_err());
        assert!(LinearRegression::default().predict_value(row).is_err());
        assert!(LogisticRegression::default().predict_distribution(row).is_err());
    }

    #[test]
    fn linear_regression_fits_a_line() {
        let schema =
            AttributeSchema::new([Attribute::numeric(AGE_MIN), Attribute::numeric(CLICK_RATE)])
                .unwrap();
        let mut data = Dataset::new("line", schema, Vec::new()).unwrap();
        for age in (18..=60).step_by(6) {
            let age_cell = age.to_string();
            let rate_cell = (0.01 + 0.001 * f64::from(age)).to_string();
            data.push_text_row(&[age_cell.as_str(), rate_cell.as_str()])
                .unwrap();
        }
        let data = data.to_rate().unwrap();
        let mut linear = LinearRegression::default();
        linear.train(&data).unwrap();
        for row in data.rows() {
            let expected = row.numeric(CLICK_RATE).unwrap();
            assert!((linear.predict_value(row).unwrap() - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn logistic_ranks_the_stronger_creative_higher() {
        let schema = AttributeSchema::new([
            Attribute::nominal(BODY, ["strong", "weak"]),
            Attribute::numeric("Clicks Count"),
            Attribute::numeric("Impressions"),
        ])
        .unwrap();
        let mut ads = Dataset::new("pair", schema, Vec::new()).unwrap();
        ads.push_text_row(&["strong", "50", "100"]).unwrap();
        ads.push_text_row(&["weak", "5", "100"]).unwrap();
        let adapted = NominalEstimator::adapt(&ads).unwrap();

        let mut logistic = LogisticRegression::default();
        logistic.train(&adapted).unwrap();
        let strong = logistic.predict_distribution(ads.row(0).unwrap()).unwrap();
        let weak = logistic.predict_distribution(ads.row(1).unwrap()).unwrap();
        assert!((strong[0] + strong[1] - 1.0).abs() < 1e-12);
        assert!(strong[0] > weak[0]);
        assert!(strong[0] > 0.3 && weak[0] < 0.15, "{strong:?} {weak:?}");
    }

    #[test]
    fn logistic_needs_binary_response() {
        let mut logistic = LogisticRegression::default();
        let err = logistic.train(&sample_ads().to_rate().unwrap()).unwrap_err();
        assert!(err.to_string().contains("two-valued nominal response"));
    }
}
