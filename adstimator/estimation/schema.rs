use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EstimationError, Result};

/// Gender targeting attribute.
pub const GENDER: &str = "Gender";
/// Lower bound of the targeted age range.
pub const AGE_MIN: &str = "Age Min";
/// Upper bound of the targeted age range.
pub const AGE_MAX: &str = "Age Max";
/// Ad body text.
pub const BODY: &str = "Body";
/// Ad image reference.
pub const IMAGE_HASH: &str = "Image Hash";
/// Raw click count.
pub const CLICKS_COUNT: &str = "Clicks Count";
/// Raw impression count.
pub const IMPRESSIONS: &str = "Impressions";
/// Derived click rate (clicks / impressions).
pub const CLICK_RATE: &str = "Click Rate";
/// Binary response introduced by the nominal adaptation.
pub const ACTION: &str = "Action";

/// Audience targeting dimensions.
pub const TARGETS: [&str; 3] = [GENDER, AGE_MIN, AGE_MAX];
/// Creative identity.
pub const CONTENT: [&str; 2] = [BODY, IMAGE_HASH];
/// Performance signal.
pub const METRICS: [&str; 3] = [CLICKS_COUNT, IMPRESSIONS, CLICK_RATE];

/// Normalized form used to compare attribute names.
///
/// `Clicks Count`, `Clicks_Count` and `clickscount` all normalize to the same key.
#[must_use]
pub fn canonical(name: &str) -> String {
    name.chars()
        .filter(|c| *c != ' ' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether two attribute names refer to the same attribute.
#[must_use]
pub fn same_name(a: &str, b: &str) -> bool {
    canonical(a) == canonical(b)
}

/// Semantic role of an attribute, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeRole {
    /// Audience targeting.
    Target,
    /// Creative identity.
    Content,
    /// Performance signal.
    Metric,
    /// Anything else (e.g. the nominal `Action` response).
    Other,
}

impl AttributeRole {
    /// Resolves the role for an attribute name.
    #[must_use]
    pub fn of(name: &str) -> Self {
        let key = canonical(name);
        let matches = |names: &[&str]| names.iter().any(|candidate| canonical(candidate) == key);
        if matches(&TARGETS) {
            Self::Target
        } else if matches(&CONTENT) {
            Self::Content
        } else if matches(&METRICS) {
            Self::Metric
        } else {
            Self::Other
        }
    }
}

/// Value domain of an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttributeKind {
    /// Fixed, enumerable set of labels.
    Nominal {
        /// Labels in declaration order; values refer to them by index.
        values: Vec<String>,
    },
    /// Real-valued.
    Numeric,
}

/// Named attribute of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Display name.
    pub name: String,
    /// Value domain.
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl Attribute {
    /// Creates a nominal attribute.
    pub fn nominal<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: AttributeKind::Nominal {
                values: values.into_iter().map(Into::into).collect(),
            },
        }
    }

    /// Creates a numeric attribute.
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Numeric,
        }
    }

    /// Semantic role of this attribute.
    #[must_use]
    pub fn role(&self) -> AttributeRole {
        AttributeRole::of(&self.name)
    }

    /// Whether the attribute is nominal.
    #[must_use]
    pub const fn is_nominal(&self) -> bool {
        matches!(self.kind, AttributeKind::Nominal { .. })
    }

    /// Nominal labels; empty for numeric attributes.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        match &self.kind {
            AttributeKind::Nominal { values } => values,
            AttributeKind::Numeric => &[],
        }
    }

    /// Index of a nominal label.
    #[must_use]
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels().iter().position(|value| value == label)
    }
}

/// Ordered list of uniquely named attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Attribute>", into = "Vec<Attribute>")]
pub struct AttributeSchema {
    attributes: IndexMap<String, Attribute>,
}

impl AttributeSchema {
    /// Builds a schema, rejecting names that collide once normalized.
    pub fn new(attributes: impl IntoIterator<Item = Attribute>) -> Result<Self> {
        let mut schema = Self::default();
        for attribute in attributes {
            schema.push(attribute)?;
        }
        Ok(schema)
    }

    /// Appends an attribute at the end.
    pub fn push(&mut self, attribute: Attribute) -> Result<()> {
        let key = canonical(&attribute.name);
        if self.attributes.contains_key(&key) {
            return Err(EstimationError::Schema(format!(
                "duplicate attribute `{}`",
                attribute.name
            )));
        }
        self.attributes.insert(key, attribute);
        Ok(())
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the schema has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Attribute at `index`.
    #[must_use]
    pub fn attribute(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get_index(index).map(|(_, attribute)| attribute)
    }

    /// Position of the attribute called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.get_index_of(&canonical(name))
    }

    /// Attribute called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(&canonical(name))
    }

    /// Whether an attribute called `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(&canonical(name))
    }

    /// Display names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|attribute| attribute.name.as_str()).collect()
    }

    /// Positions of every attribute with `role`.
    #[must_use]
    pub fn indices_with_role(&self, role: AttributeRole) -> Vec<usize> {
        self.iter()
            .enumerate()
            .filter(|(_, attribute)| attribute.role() == role)
            .map(|(index, _)| index)
            .collect()
    }

    /// Whether any attribute has `role`.
    #[must_use]
    pub fn has_role(&self, role: AttributeRole) -> bool {
        self.iter().any(|attribute| attribute.role() == role)
    }

    /// Copy keeping only the attributes at `keep`, in schema order.
    pub(crate) fn retain_indices(&self, keep: &[usize]) -> Self {
        let attributes = self
            .attributes
            .iter()
            .enumerate()
            .filter(|(index, _)| keep.contains(index))
            .map(|(_, (key, attribute))| (key.clone(), attribute.clone()))
            .collect();
        Self { attributes }
    }
}

impl TryFrom<Vec<Attribute>> for AttributeSchema {
    type Error = EstimationError;

    fn try_from(attributes: Vec<Attribute>) -> Result<Self> {
        Self::new(attributes)
    }
}

impl From<AttributeSchema> for Vec<Attribute> {
    fn from(schema: AttributeSchema) -> Self {
        schema.attributes.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_ignore_spacing_and_case() {
        assert_eq!(AttributeRole::of("Clicks_Count"), AttributeRole::Metric);
        assert_eq!(AttributeRole::of("ClickRate"), AttributeRole::Metric);
        assert_eq!(AttributeRole::of("image hash"), AttributeRole::Content);
        assert_eq!(AttributeRole::of("AgeMin"), AttributeRole::Target);
        assert_eq!(AttributeRole::of("Action"), AttributeRole::Other);
    }

    #[test]
    fn schema_rejects_normalized_duplicates() {
        let err = AttributeSchema::new([
            Attribute::numeric("Clicks Count"),
            Attribute::numeric("Clicks_Count"),
        ])
        .unwrap_err();
        assert!(matches!(err, EstimationError::Schema(_)));
    }

    #[test]
    fn lookup_by_any_spelling() {
        let schema = AttributeSchema::new([
            Attribute::nominal(BODY, ["Text-1", "Text-2"]),
            Attribute::numeric("Impressions"),
        ])
        .unwrap();
        assert_eq!(schema.index_of("body"), Some(0));
        assert_eq!(schema.get("IMPRESSIONS").unwrap().name, "Impressions");
        assert_eq!(schema.attribute(0).unwrap().label_index("Text-2"), Some(1));
        assert_eq!(schema.indices_with_role(AttributeRole::Metric), vec![1]);
    }

    #[test]
    fn schema_serializes_as_attribute_list() {
        let schema = AttributeSchema::new([
            Attribute::nominal(GENDER, ["M", "F"]),
            Attribute::numeric(AGE_MIN),
        ])
        .unwrap();
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json[0]["type"], "nominal");
        assert_eq!(json[1]["name"], "Age Min");
        let back: AttributeSchema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
    }
}
