use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::{EstimationError, Result},
    schema::{
        same_name, Attribute, AttributeKind, AttributeRole, AttributeSchema, AGE_MAX, AGE_MIN,
        CLICKS_COUNT, CLICK_RATE, IMPRESSIONS,
    },
};

/// Absolute tolerance used when comparing numeric values.
pub const MATCH_TOLERANCE: f64 = 1e-5;

/// Single attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Index into the attribute's nominal labels.
    Nominal(usize),
    /// Real value.
    Numeric(f64),
    /// Unknown or not yet computed.
    #[default]
    Missing,
}

impl Value {
    /// Numeric payload, if any.
    #[must_use]
    pub const fn as_numeric(self) -> Option<f64> {
        match self {
            Self::Numeric(value) => Some(value),
            _ => None,
        }
    }

    /// Nominal index, if any.
    #[must_use]
    pub const fn as_nominal(self) -> Option<usize> {
        match self {
            Self::Nominal(index) => Some(index),
            _ => None,
        }
    }

    /// Whether the value is missing.
    #[must_use]
    pub const fn is_missing(self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// One row of a dataset, positionally aligned with its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
    weight: f64,
}

impl Record {
    /// Creates a record with unit weight.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            weight: 1.0,
        }
    }

    /// Replaces the instance weight.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub(crate) fn appended(mut self, value: Value) -> Self {
        self.values.push(value);
        self
    }

    /// Values in schema order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at `index`, missing when out of range.
    #[must_use]
    pub fn value(&self, index: usize) -> Value {
        self.values.get(index).copied().unwrap_or_default()
    }

    /// Instance weight.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    fn project(&self, keep: &[usize]) -> Self {
        Self {
            values: keep.iter().map(|index| self.value(*index)).collect(),
            weight: self.weight,
        }
    }
}

/// Borrowed view of a record together with the schema it conforms to.
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    schema: &'a AttributeSchema,
    record: &'a Record,
}

impl<'a> RecordRef<'a> {
    /// Pairs a record with its schema.
    #[must_use]
    pub const fn new(schema: &'a AttributeSchema, record: &'a Record) -> Self {
        Self { schema, record }
    }

    /// Schema of the record.
    #[must_use]
    pub const fn schema(&self) -> &'a AttributeSchema {
        self.schema
    }

    /// Underlying record.
    #[must_use]
    pub const fn record(&self) -> &'a Record {
        self.record
    }

    /// Instance weight.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.record.weight
    }

    /// Value of the attribute called `name`; `None` when the schema has no such attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.schema
            .index_of(name)
            .map(|index| self.record.value(index))
    }

    /// Numeric value of `name`.
    #[must_use]
    pub fn numeric(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_numeric)
    }

    /// Nominal label of `name`.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&'a str> {
        let index = self.schema.index_of(name)?;
        self.label_at(index)
    }

    fn label_at(&self, index: usize) -> Option<&'a str> {
        let attribute = self.schema.attribute(index)?;
        let value = self.record.value(index).as_nominal()?;
        attribute.labels().get(value).map(String::as_str)
    }

    /// Printable value of `name` (`?` for missing values).
    #[must_use]
    pub fn display(&self, name: &str) -> Option<String> {
        let index = self.schema.index_of(name)?;
        Some(self.display_at(index))
    }

    fn display_at(&self, index: usize) -> String {
        match self.record.value(index) {
            Value::Nominal(_) => self.label_at(index).unwrap_or("?").to_owned(),
            Value::Numeric(value) => value.to_string(),
            Value::Missing => "?".to_owned(),
        }
    }

    /// Click rate of the record: `Click Rate` when present, otherwise clicks / impressions.
    pub fn rate(&self) -> Result<f64> {
        if let Some(index) = self.schema.index_of(CLICK_RATE) {
            return self.record.value(index).as_numeric().ok_or_else(|| {
                EstimationError::Schema(format!("record has no {CLICK_RATE} value"))
            });
        }
        let (clicks, impressions) = count_indices(self.schema)?;
        let (clicks, impressions) = counts(self.schema, self.record, clicks, impressions)?;
        if impressions == 0.0 {
            return Err(EstimationError::Arithmetic(
                "click rate of a record with zero impressions".into(),
            ));
        }
        Ok(clicks / impressions)
    }

    /// Whether both records agree on every content attribute of `self`.
    fn same_content(&self, probe: &RecordRef<'_>) -> bool {
        self.schema
            .iter()
            .enumerate()
            .filter(|(_, attribute)| attribute.role() == AttributeRole::Content)
            .all(|(index, attribute)| {
                let ours = self.record.value(index);
                let theirs = probe.get(&attribute.name).unwrap_or_default();
                match (ours, theirs) {
                    (Value::Missing, Value::Missing) => true,
                    (Value::Numeric(a), Value::Numeric(b)) => (a - b).abs() <= MATCH_TOLERANCE,
                    (Value::Nominal(_), Value::Nominal(_)) => {
                        self.label_at(index).is_some()
                            && self.label_at(index) == probe.label(&attribute.name)
                    }
                    _ => false,
                }
            })
    }
}

/// Ordered collection of records sharing one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DatasetDocument", into = "DatasetDocument")]
pub struct Dataset {
    name: String,
    schema: AttributeSchema,
    records: Vec<Record>,
    response: Option<usize>,
}

impl Dataset {
    /// Builds a dataset after checking every record against the schema.
    ///
    /// When the schema carries no metric attribute, an empty `Click Rate` attribute is appended.
    pub fn new(
        name: impl Into<String>,
        mut schema: AttributeSchema,
        mut records: Vec<Record>,
    ) -> Result<Self> {
        for record in &records {
            check_record(&schema, record)?;
        }
        if !schema.has_role(AttributeRole::Metric) {
            schema.push(Attribute::numeric(CLICK_RATE))?;
            for record in &mut records {
                record.values.push(Value::Missing);
            }
        }
        Ok(Self {
            name: name.into(),
            schema,
            records,
            response: None,
        })
    }

    pub(crate) fn from_parts(
        name: impl Into<String>,
        schema: AttributeSchema,
        records: Vec<Record>,
        response: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            records,
            response,
        }
    }

    /// Dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute schema.
    #[must_use]
    pub const fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Records in order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Response (class) attribute, if designated.
    #[must_use]
    pub fn response(&self) -> Option<&Attribute> {
        self.response.and_then(|index| self.schema.attribute(index))
    }

    /// Position of the response attribute.
    #[must_use]
    pub const fn response_index(&self) -> Option<usize> {
        self.response
    }

    /// Copy designating `name` as the response attribute.
    pub fn with_response(mut self, name: &str) -> Result<Self> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| EstimationError::missing([name]))?;
        self.response = Some(index);
        Ok(self)
    }

    /// Column names, for rendering.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.names()
    }

    /// Row at `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<RecordRef<'_>> {
        self.records
            .get(index)
            .map(|record| RecordRef::new(&self.schema, record))
    }

    /// Rows in order.
    pub fn rows(&self) -> impl Iterator<Item = RecordRef<'_>> + '_ {
        self.records
            .iter()
            .map(|record| RecordRef::new(&self.schema, record))
    }

    /// Appends a record after checking it against the schema.
    pub fn push(&mut self, record: Record) -> Result<()> {
        check_record(&self.schema, &record)?;
        self.records.push(record);
        Ok(())
    }

    /// Parses and appends a row of textual cells: nominal labels, numbers, or `?` for missing.
    pub fn push_text_row(&mut self, cells: &[&str]) -> Result<()> {
        if cells.len() != self.schema.len() {
            return Err(EstimationError::Schema(format!(
                "row has {} cells, schema has {} attributes",
                cells.len(),
                self.schema.len()
            )));
        }
        let values = self
            .schema
            .iter()
            .zip(cells)
            .map(|(attribute, cell)| parse_cell(attribute, cell))
            .collect::<Result<Vec<_>>>()?;
        self.push(Record::new(values))
    }

    /// Same schema and response, no records.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        self.with_records(Vec::new())
    }

    pub(crate) fn with_records(&self, records: Vec<Record>) -> Self {
        Self::from_parts(
            self.name.clone(),
            self.schema.clone(),
            records,
            self.response,
        )
    }

    /// Copy with only the attributes at `keep`; the response survives if kept.
    pub(crate) fn project(&self, keep: &[usize]) -> Self {
        let response = self
            .response
            .and_then(|index| keep.iter().position(|kept| *kept == index));
        Self::from_parts(
            self.name.clone(),
            self.schema.retain_indices(keep),
            self.records.iter().map(|record| record.project(keep)).collect(),
            response,
        )
    }

    /// Copy with `attribute` appended, filled by `fill` per record.
    pub(crate) fn append_attribute(
        &self,
        attribute: Attribute,
        mut fill: impl FnMut(RecordRef<'_>) -> Result<Value>,
    ) -> Result<Self> {
        let mut schema = self.schema.clone();
        schema.push(attribute)?;
        let records = self
            .rows()
            .map(|row| -> Result<Record> {
                let mut record = row.record().clone();
                record.values.push(fill(row)?);
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_parts(
            self.name.clone(),
            schema,
            records,
            self.response,
        ))
    }

    /// Positions of the raw click and impression counts.
    pub(crate) fn count_indices(&self) -> Result<(usize, usize)> {
        count_indices(&self.schema)
    }

    /// Converts raw counts into a `Click Rate` response.
    ///
    /// Returns an unchanged copy when `Click Rate` already exists. Records with zero impressions must
    /// be filtered out beforehand; they fail with [`EstimationError::Arithmetic`].
    pub fn to_rate(&self) -> Result<Self> {
        if let Some(index) = self.schema.index_of(CLICK_RATE) {
            let mut converted = self.clone();
            converted.response = Some(index);
            return Ok(converted);
        }
        let (clicks, impressions) = self.count_indices()?;
        let keep: Vec<usize> = (0..self.schema.len())
            .filter(|index| *index != clicks && *index != impressions)
            .collect();
        let rates = self
            .records
            .iter()
            .map(|record| {
                let (clicks, impressions) = counts(&self.schema, record, clicks, impressions)?;
                if impressions == 0.0 {
                    return Err(EstimationError::Arithmetic(
                        "cannot convert a record with zero impressions to a click rate".into(),
                    ));
                }
                Ok(clicks / impressions)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut converted = self.project(&keep);
        converted.schema.push(Attribute::numeric(CLICK_RATE))?;
        for (record, rate) in converted.records.iter_mut().zip(rates) {
            record.values.push(Value::Numeric(rate));
        }
        converted.response = Some(converted.schema.len() - 1);
        Ok(converted)
    }

    /// Copy without any metric attribute, with an empty `Click Rate` response appended.
    pub fn without_metrics(&self) -> Result<Self> {
        let keep: Vec<usize> = self
            .schema
            .iter()
            .enumerate()
            .filter(|(_, attribute)| attribute.role() != AttributeRole::Metric)
            .map(|(index, _)| index)
            .collect();
        self.project(&keep)
            .append_attribute(Attribute::numeric(CLICK_RATE), |_| Ok(Value::Missing))?
            .with_response(CLICK_RATE)
    }

    /// Copy whose `Click Rate` response holds `estimates`, one per record in order.
    ///
    /// Any existing `Click Rate` attribute is replaced; raw counts are kept.
    pub fn with_estimates(&self, estimates: &[f64]) -> Result<Self> {
        if estimates.len() != self.records.len() {
            return Err(EstimationError::InvalidArgument(format!(
                "{} estimates for {} records",
                estimates.len(),
                self.records.len()
            )));
        }
        let existing = self.schema.index_of(CLICK_RATE);
        let keep: Vec<usize> = (0..self.schema.len())
            .filter(|index| Some(*index) != existing)
            .collect();
        let mut estimates = estimates.iter().copied();
        self.project(&keep)
            .append_attribute(Attribute::numeric(CLICK_RATE), |_| {
                Ok(estimates.next().map_or(Value::Missing, Value::Numeric))
            })?
            .with_response(CLICK_RATE)
    }

    /// Average click rate.
    ///
    /// With a `Click Rate` attribute this is the mean of the known rates. Otherwise it is the ratio
    /// of summed clicks to summed impressions, not a mean of per-record ratios.
    pub fn average_rate(&self) -> Result<f64> {
        if let Some(index) = self.schema.index_of(CLICK_RATE) {
            let rates: Vec<f64> = self
                .records
                .iter()
                .filter_map(|record| record.value(index).as_numeric())
                .collect();
            if rates.is_empty() {
                return Err(EstimationError::Arithmetic(
                    "average rate of a data set without known rates".into(),
                ));
            }
            return Ok(rates.iter().sum::<f64>() / rates.len() as f64);
        }
        let (clicks, impressions) = self.count_indices()?;
        let mut total_clicks = 0.0;
        let mut total_impressions = 0.0;
        for record in &self.records {
            let (c, i) = counts(&self.schema, record, clicks, impressions)?;
            total_clicks += c;
            total_impressions += i;
        }
        if total_impressions == 0.0 {
            return Err(EstimationError::Arithmetic(
                "average rate of a data set without impressions".into(),
            ));
        }
        Ok(total_clicks / total_impressions)
    }

    /// First record whose content attributes equal those of `probe`.
    ///
    /// Target and metric attributes are ignored. Nominal values match by label, numeric values
    /// within [`MATCH_TOLERANCE`].
    #[must_use]
    pub fn find_match(&self, probe: RecordRef<'_>) -> Option<RecordRef<'_>> {
        self.rows().find(|row| row.same_content(&probe))
    }

    /// Rows whose attributes equal every `(key, value)` filter.
    ///
    /// The key `Age` with a `min-max` value expands to `Age Min` and `Age Max`.
    pub fn filter(&self, filters: &[(&str, &str)]) -> Result<Self> {
        let mut resolved = Vec::new();
        for (key, value) in filters {
            if same_name(key, "Age") && !self.schema.contains(key) {
                let (min, max) = value.split_once('-').ok_or_else(|| {
                    EstimationError::InvalidArgument(format!("age filter `{value}` is not min-max"))
                })?;
                resolved.push(self.resolve_filter(AGE_MIN, min.trim())?);
                resolved.push(self.resolve_filter(AGE_MAX, max.trim())?);
            } else {
                resolved.push(self.resolve_filter(key, value)?);
            }
        }
        let records = self
            .records
            .iter()
            .filter(|record| {
                resolved
                    .iter()
                    .all(|(index, expected)| values_equal(record.value(*index), *expected))
            })
            .cloned()
            .collect();
        Ok(self.with_records(records))
    }

    fn resolve_filter(&self, key: &str, value: &str) -> Result<(usize, Value)> {
        let index = self
            .schema
            .index_of(key)
            .ok_or_else(|| EstimationError::Schema(format!("unknown filter attribute `{key}`")))?;
        let attribute = self
            .schema
            .attribute(index)
            .ok_or_else(|| EstimationError::Schema(format!("unknown filter attribute `{key}`")))?;
        Ok((index, parse_cell(attribute, value)?))
    }

    /// Sums clicks and impressions per distinct value of `attribute`, in first-seen order.
    pub fn aggregate(&self, attribute: &str) -> Result<Self> {
        let index = self
            .schema
            .index_of(attribute)
            .ok_or_else(|| EstimationError::missing([attribute]))?;
        let (clicks, impressions) = self.count_indices()?;
        let mut groups: IndexMap<String, (Value, f64, f64)> = IndexMap::new();
        for row in self.rows() {
            let (c, i) = counts(&self.schema, row.record(), clicks, impressions)?;
            let entry = groups
                .entry(row.display_at(index))
                .or_insert((row.record().value(index), 0.0, 0.0));
            entry.1 += c;
            entry.2 += i;
        }
        let grouped_attribute = self
            .schema
            .attribute(index)
            .cloned()
            .ok_or_else(|| EstimationError::missing([attribute]))?;
        let schema = AttributeSchema::new([
            grouped_attribute,
            Attribute::numeric(CLICKS_COUNT),
            Attribute::numeric(IMPRESSIONS),
        ])?;
        let records = groups
            .into_values()
            .map(|(value, c, i)| Record::new(vec![value, Value::Numeric(c), Value::Numeric(i)]))
            .collect();
        Self::new(self.name.clone(), schema, records)
    }
}

fn check_record(schema: &AttributeSchema, record: &Record) -> Result<()> {
    if record.values.len() != schema.len() {
        return Err(EstimationError::Schema(format!(
            "record has {} values, schema has {} attributes",
            record.values.len(),
            schema.len()
        )));
    }
    for (attribute, value) in schema.iter().zip(&record.values) {
        let valid = match (&attribute.kind, value) {
            (_, Value::Missing) => true,
            (AttributeKind::Nominal { values }, Value::Nominal(index)) => *index < values.len(),
            (AttributeKind::Numeric, Value::Numeric(_)) => true,
            _ => false,
        };
        if !valid {
            return Err(EstimationError::Schema(format!(
                "value {value:?} does not fit attribute `{}`",
                attribute.name
            )));
        }
    }
    Ok(())
}

fn parse_cell(attribute: &Attribute, cell: &str) -> Result<Value> {
    let cell = cell.trim();
    if cell == "?" {
        return Ok(Value::Missing);
    }
    match &attribute.kind {
        AttributeKind::Nominal { .. } => attribute
            .label_index(cell)
            .map(Value::Nominal)
            .ok_or_else(|| {
                EstimationError::Schema(format!(
                    "`{cell}` is not a value of attribute `{}`",
                    attribute.name
                ))
            }),
        AttributeKind::Numeric => cell.parse::<f64>().map(Value::Numeric).map_err(|_| {
            EstimationError::InvalidArgument(format!(
                "`{cell}` is not a number for attribute `{}`",
                attribute.name
            ))
        }),
    }
}

fn values_equal(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Numeric(a), Value::Numeric(b)) => (a - b).abs() <= MATCH_TOLERANCE,
        (a, b) => a == b,
    }
}

fn count_indices(schema: &AttributeSchema) -> Result<(usize, usize)> {
    match (schema.index_of(CLICKS_COUNT), schema.index_of(IMPRESSIONS)) {
        (Some(clicks), Some(impressions)) => Ok((clicks, impressions)),
        _ => Err(EstimationError::missing([CLICKS_COUNT, IMPRESSIONS])),
    }
}

/// Click and impression counts of a record, rejecting missing or negative values.
pub(crate) fn counts(
    schema: &AttributeSchema,
    record: &Record,
    clicks: usize,
    impressions: usize,
) -> Result<(f64, f64)> {
    let read = |index: usize| -> Result<f64> {
        let name = schema
            .attribute(index)
            .map_or("count", |attribute| attribute.name.as_str());
        let value = record
            .value(index)
            .as_numeric()
            .ok_or_else(|| EstimationError::Schema(format!("record has no `{name}` value")))?;
        if value < 0.0 {
            return Err(EstimationError::InvalidArgument(format!(
                "negative `{name}` count {value}"
            )));
        }
        Ok(value)
    };
    Ok((read(clicks)?, read(impressions)?))
}

#[derive(Serialize, Deserialize)]
struct DatasetDocument {
    #[serde(default)]
    name: String,
    attributes: AttributeSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    #[serde(default)]
    rows: Vec<RowDocument>,
}

#[derive(Serialize, Deserialize)]
struct RowDocument {
    values: Vec<Option<Cell>>,
    #[serde(default = "unit_weight", skip_serializing_if = "is_unit_weight")]
    weight: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Cell {
    Number(f64),
    Label(String),
}

const fn unit_weight() -> f64 {
    1.0
}

#[allow(clippy::trivially_copy_pass_by_ref, clippy::float_cmp)]
fn is_unit_weight(weight: &f64) -> bool {
    *weight == 1.0
}

impl TryFrom<DatasetDocument> for Dataset {
    type Error = EstimationError;

    fn try_from(document: DatasetDocument) -> Result<Self> {
        let schema = document.attributes;
        let mut records = Vec::with_capacity(document.rows.len());
        for row in document.rows {
            if row.values.len() != schema.len() {
                return Err(EstimationError::Schema(format!(
                    "row has {} values, schema has {} attributes",
                    row.values.len(),
                    schema.len()
                )));
            }
            let values = schema
                .iter()
                .zip(row.values)
                .map(|(attribute, cell)| match (cell, &attribute.kind) {
                    (None, _) => Ok(Value::Missing),
                    (Some(Cell::Number(value)), AttributeKind::Numeric) => {
                        Ok(Value::Numeric(value))
                    }
                    (Some(Cell::Label(label)), _) => parse_cell(attribute, &label),
                    (Some(Cell::Number(value)), AttributeKind::Nominal { .. }) => {
                        parse_cell(attribute, &value.to_string())
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            records.push(Record::new(values).with_weight(row.weight));
        }
        let dataset = Self::new(document.name, schema, records)?;
        match document.response {
            Some(response) => dataset.with_response(&response),
            None => Ok(dataset),
        }
    }
}

impl From<Dataset> for DatasetDocument {
    fn from(dataset: Dataset) -> Self {
        let response = dataset.response().map(|attribute| attribute.name.clone());
        let rows = dataset
            .rows()
            .map(|row| RowDocument {
                values: row
                    .record()
                    .values()
                    .iter()
                    .enumerate()
                    .map(|(index, value)| match value {
                        Value::Missing => None,
                        Value::Numeric(number) => Some(Cell::Number(*number)),
                        Value::Nominal(_) => row.label_at(index).map(|label| Cell::Label(label.into())),
                    })
                    .collect(),
                weight: row.weight(),
            })
            .collect();
        Self {
            name: dataset.name,
            attributes: dataset.schema,
            response,
            rows,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::schema::{BODY, GENDER, IMAGE_HASH};

    /// Campaign schema: targeting, content, raw counts.
    pub(crate) fn campaign_schema(bodies: &[&str], images: &[&str]) -> AttributeSchema {
        AttributeSchema::new([
            Attribute::nominal(GENDER, ["M", "F"]),
            Attribute::numeric(AGE_MIN),
            Attribute::numeric(AGE_MAX),
            Attribute::nominal(BODY, bodies.iter().copied()),
            Attribute::nominal(IMAGE_HASH, images.iter().copied()),
            Attribute::numeric(CLICKS_COUNT),
            Attribute::numeric(IMPRESSIONS),
        ])
        .unwrap()
    }

    /// Four campaigns over two bodies and three images: 28 clicks, 550 impressions.
    pub(crate) fn sample_ads() -> Dataset {
        let mut ads = Dataset::new(
            "ads",
            campaign_schema(&["Text-1", "Text-2"], &["Image-1", "Image-2", "Image-3"]),
            Vec::new(),
        )
        .unwrap();
        for row in [
            ["F", "18", "23", "Text-1", "Image-1", "5", "100"],
            ["M", "18", "23", "Text-1", "Image-2", "7", "100"],
            ["F", "24", "29", "Text-2", "Image-2", "10", "200"],
            ["M", "24", "29", "Text-1", "Image-3", "6", "150"],
        ] {
            ads.push_text_row(&row).unwrap();
        }
        ads
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{campaign_schema, sample_ads};
    use super::*;
    use crate::schema::{BODY, GENDER, IMAGE_HASH};

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn implicit_click_rate_without_metrics() {
        let schema = AttributeSchema::new([Attribute::nominal(BODY, ["a", "b"])]).unwrap();
        let dataset = Dataset::new("bodies", schema, vec![Record::new(vec![Value::Nominal(1)])])
            .unwrap();
        assert_eq!(dataset.column_names(), vec![BODY, CLICK_RATE]);
        assert!(dataset.row(0).unwrap().get(CLICK_RATE).unwrap().is_missing());
    }

    #[test]
    fn rejects_records_that_do_not_fit() {
        let schema = campaign_schema(&["Text-1"], &["Image-1"]);
        let err = Dataset::new("bad", schema, vec![Record::new(vec![Value::Nominal(0)])])
            .unwrap_err();
        assert!(matches!(err, EstimationError::Schema(_)));

        let mut ads = sample_ads();
        let err = ads
            .push_text_row(&["F", "18", "23", "Text-9", "Image-1", "1", "10"])
            .unwrap_err();
        assert!(matches!(err, EstimationError::Schema(_)));
    }

    #[test]
    fn converts_counts_to_rate() {
        let rated = sample_ads().to_rate().unwrap();
        assert!(!rated.schema().contains(CLICKS_COUNT));
        assert!(!rated.schema().contains(IMPRESSIONS));
        assert_eq!(rated.response().unwrap().name, CLICK_RATE);
        assert_close(rated.row(0).unwrap().numeric(CLICK_RATE).unwrap(), 0.05);
        assert_close(rated.row(3).unwrap().numeric(CLICK_RATE).unwrap(), 0.04);
    }

    #[test]
    fn rate_conversion_is_idempotent() {
        let once = sample_ads().to_rate().unwrap();
        let twice = once.to_rate().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rate_conversion_rejects_zero_impressions() {
        let mut ads = sample_ads();
        ads.push_text_row(&["M", "30", "35", "Text-2", "Image-1", "0", "0"])
            .unwrap();
        assert!(matches!(
            ads.to_rate().unwrap_err(),
            EstimationError::Arithmetic(_)
        ));
    }

    #[test]
    fn rate_conversion_requires_counts() {
        let schema = AttributeSchema::new([
            Attribute::nominal(BODY, ["a"]),
            Attribute::numeric(IMPRESSIONS),
        ])
        .unwrap();
        let dataset = Dataset::new("partial", schema, Vec::new()).unwrap();
        assert!(matches!(
            dataset.to_rate().unwrap_err(),
            EstimationError::MissingAttributes { .. }
        ));
    }

    #[test]
    fn average_rate_before_and_after_conversion() {
        let mut ads = Dataset::new("pair", campaign_schema(&["a", "b"], &["x"]), Vec::new())
            .unwrap();
        ads.push_text_row(&["F", "18", "23", "a", "x", "5", "100"])
            .unwrap();
        ads.push_text_row(&["M", "18", "23", "b", "x", "6", "150"])
            .unwrap();
        assert_close(ads.average_rate().unwrap(), 0.044);
        assert_close(ads.to_rate().unwrap().average_rate().unwrap(), 0.045);
        assert_close(sample_ads().average_rate().unwrap(), 28.0 / 550.0);
    }

    #[test]
    fn find_match_ignores_targeting_and_metrics() {
        let ads = sample_ads();
        let mut probe_set = ads.empty_like();
        probe_set
            .push_text_row(&["M", "60", "65", "Text-2", "Image-2", "0", "1"])
            .unwrap();
        let probe = probe_set.row(0).unwrap();
        let found = ads.find_match(probe).unwrap();
        assert_eq!(found.label(GENDER), Some("F"));
        assert_eq!(found.numeric(CLICKS_COUNT), Some(10.0));

        probe_set
            .push_text_row(&["M", "18", "23", "Text-2", "Image-3", "1", "1"])
            .unwrap();
        assert!(ads.find_match(probe_set.row(1).unwrap()).is_none());
    }

    #[test]
    fn find_match_across_schemas_by_label() {
        let ads = sample_ads();
        let validation = ads.without_metrics().unwrap();
        let probe = validation.row(2).unwrap();
        let found = ads.find_match(probe).unwrap();
        assert_eq!(found.label(BODY), Some("Text-2"));
        assert_close(found.rate().unwrap(), 0.05);
    }

    #[test]
    fn numeric_content_matches_within_tolerance() {
        let schema = AttributeSchema::new([
            Attribute::numeric(AGE_MIN),
            Attribute::numeric(IMAGE_HASH),
            Attribute::numeric(CLICK_RATE),
        ])
        .unwrap();
        let mut known = Dataset::new("numeric", schema, Vec::new()).unwrap();
        known.push_text_row(&["18", "42.0", "0.1"]).unwrap();
        let mut probes = known.empty_like();
        probes.push_text_row(&["55", "42.000009", "?"]).unwrap();
        probes.push_text_row(&["18", "42.00002", "?"]).unwrap();
        assert!(known.find_match(probes.row(0).unwrap()).is_some());
        assert!(known.find_match(probes.row(1).unwrap()).is_none());
    }

    #[test]
    fn without_metrics_appends_empty_rate() {
        let stripped = sample_ads().without_metrics().unwrap();
        assert_eq!(
            stripped.column_names(),
            vec![GENDER, AGE_MIN, AGE_MAX, BODY, IMAGE_HASH, CLICK_RATE]
        );
        assert_eq!(stripped.response().unwrap().name, CLICK_RATE);
        assert!(stripped.rows().all(|row| row.get(CLICK_RATE) == Some(Value::Missing)));
    }

    #[test]
    fn filters_by_equality_and_age_range() {
        let ads = sample_ads();
        let women = ads.filter(&[("Gender", "F")]).unwrap();
        assert_eq!(women.len(), 2);
        let young_men = ads.filter(&[("Gender", "M"), ("Age", "18-23")]).unwrap();
        assert_eq!(young_men.len(), 1);
        assert_eq!(young_men.row(0).unwrap().label(IMAGE_HASH), Some("Image-2"));
        assert!(matches!(
            ads.filter(&[("Country", "SE")]).unwrap_err(),
            EstimationError::Schema(_)
        ));
    }

    #[test]
    fn aggregates_counts_per_value() {
        let by_body = sample_ads().aggregate("Body").unwrap();
        assert_eq!(by_body.column_names(), vec![BODY, CLICKS_COUNT, IMPRESSIONS]);
        assert_eq!(by_body.len(), 2);
        let first = by_body.row(0).unwrap();
        assert_eq!(first.label(BODY), Some("Text-1"));
        assert_eq!(first.numeric(CLICKS_COUNT), Some(18.0));
        assert_eq!(first.numeric(IMPRESSIONS), Some(350.0));
    }

    #[test]
    fn estimates_replace_click_rate() {
        let stripped = sample_ads().without_metrics().unwrap();
        let estimated = stripped.with_estimates(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(estimated.column_names(), stripped.column_names());
        assert_eq!(estimated.response().unwrap().name, CLICK_RATE);
        assert_eq!(estimated.row(3).unwrap().numeric(CLICK_RATE), Some(0.4));
        assert!(matches!(
            stripped.with_estimates(&[0.1]).unwrap_err(),
            EstimationError::InvalidArgument(_)
        ));
    }

    #[test]
    fn json_document_uses_labels() {
        let ads = sample_ads().to_rate().unwrap();
        let json = serde_json::to_value(&ads).unwrap();
        assert_eq!(json["response"], CLICK_RATE);
        assert_eq!(json["rows"][0]["values"][3], "Text-1");
        let back: Dataset = serde_json::from_value(json).unwrap();
        assert_eq!(back, ads);
    }
}
