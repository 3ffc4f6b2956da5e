use serde::{Deserialize, Serialize};

use crate::{
    dataset::{Dataset, RecordRef, Value},
    schema::{AttributeKind, AttributeRole},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum EncodedColumn {
    OneHot { name: String, labels: Vec<String> },
    Scaled { name: String, mean: f64, scale: f64 },
}

/// Maps records to dense feature vectors.
///
/// Nominal attributes become one-hot blocks and numeric attributes are standardized with the mean
/// and deviation seen during fitting. The response and every metric attribute are left out.
/// Columns are resolved by attribute name, so records from other schemas encode consistently;
/// missing values and unseen labels encode as zeros.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureEncoder {
    columns: Vec<EncodedColumn>,
}

impl FeatureEncoder {
    /// Learns the encoding from `data`.
    #[must_use]
    pub fn fit(data: &Dataset) -> Self {
        let response = data.response_index();
        let columns = data
            .schema()
            .iter()
            .enumerate()
            .filter(|(index, attribute)| {
                Some(*index) != response && attribute.role() != AttributeRole::Metric
            })
            .map(|(index, attribute)| match &attribute.kind {
                AttributeKind::Nominal { values } => EncodedColumn::OneHot {
                    name: attribute.name.clone(),
                    labels: values.clone(),
                },
                AttributeKind::Numeric => {
                    let known: Vec<f64> = data
                        .records()
                        .iter()
                        .filter_map(|record| record.value(index).as_numeric())
                        .collect();
                    let (mean, scale) = moments(&known);
                    EncodedColumn::Scaled {
                        name: attribute.name.clone(),
                        mean,
                        scale,
                    }
                }
            })
            .collect();
        Self { columns }
    }

    /// Length of every encoded vector.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns
            .iter()
            .map(|column| match column {
                EncodedColumn::OneHot { labels, .. } => labels.len(),
                EncodedColumn::Scaled { .. } => 1,
            })
            .sum()
    }

    /// Feature vector of `record`.
    #[must_use]
    pub fn encode(&self, record: RecordRef<'_>) -> Vec<f64> {
        let mut features = Vec::with_capacity(self.width());
        for column in &self.columns {
            match column {
                EncodedColumn::OneHot { name, labels } => {
                    let label = record.label(name);
                    features.extend(
                        labels
                            .iter()
                            .map(|candidate| f64::from(u8::from(label == Some(candidate.as_str())))),
                    );
                }
                EncodedColumn::Scaled { name, mean, scale } => {
                    let value = match record.get(name) {
                        Some(Value::Numeric(value)) => (value - mean) / scale,
                        _ => 0.0,
                    };
                    features.push(value);
                }
            }
        }
        features
    }
}

fn moments(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count;
    (mean, variance.sqrt().max(1e-6))
}
