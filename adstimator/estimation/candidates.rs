use std::cell::OnceCell;

use crate::{
    dataset::{Dataset, Record, RecordRef, Value, MATCH_TOLERANCE},
    schema::{Attribute, AttributeKind, AttributeRole},
};

/// Source of candidate creatives to estimate.
pub trait CandidateSource {
    /// Every candidate, computed once and reused on later calls.
    fn all(&self) -> &Dataset;
}

/// Enumerates content combinations that the knowledge has no record for.
///
/// Every content attribute branches over its domain (declared labels for nominal attributes,
/// distinct observed values for numeric ones); all other attributes stay missing during
/// enumeration and are dropped from the output.
#[derive(Debug)]
pub struct CombinationGenerator<'a> {
    source: &'a Dataset,
    candidates: OnceCell<Dataset>,
}

impl<'a> CombinationGenerator<'a> {
    /// Generator over the content domains of `source`.
    #[must_use]
    pub const fn new(source: &'a Dataset) -> Self {
        Self {
            source,
            candidates: OnceCell::new(),
        }
    }

    /// Knowledge the candidates are drawn from.
    #[must_use]
    pub const fn source(&self) -> &'a Dataset {
        self.source
    }

    fn generate(&self) -> Dataset {
        let schema = self.source.schema();
        let domains: Vec<Option<Vec<Value>>> = schema
            .iter()
            .enumerate()
            .map(|(index, attribute)| {
                (attribute.role() == AttributeRole::Content)
                    .then(|| domain(self.source, index, attribute))
            })
            .collect();

        let mut stack: Vec<Vec<Value>> = vec![Vec::with_capacity(schema.len())];
        let mut combinations = Vec::new();
        while let Some(partial) = stack.pop() {
            match domains.get(partial.len()) {
                None => combinations.push(Record::new(partial)),
                Some(None) => {
                    let mut next = partial;
                    next.push(Value::Missing);
                    stack.push(next);
                }
                Some(Some(values)) => {
                    // reversed so combinations pop out in domain order
                    for value in values.iter().rev() {
                        let mut next = partial.clone();
                        next.push(*value);
                        stack.push(next);
                    }
                }
            }
        }

        let unseen: Vec<Record> = combinations
            .into_iter()
            .filter(|record| {
                self.source
                    .find_match(RecordRef::new(schema, record))
                    .is_none()
            })
            .collect();
        self.source
            .with_records(unseen)
            .project(&schema.indices_with_role(AttributeRole::Content))
    }
}

impl CandidateSource for CombinationGenerator<'_> {
    fn all(&self) -> &Dataset {
        self.candidates.get_or_init(|| self.generate())
    }
}

fn domain(source: &Dataset, index: usize, attribute: &Attribute) -> Vec<Value> {
    match &attribute.kind {
        AttributeKind::Nominal { values } => (0..values.len()).map(Value::Nominal).collect(),
        AttributeKind::Numeric => {
            let mut seen: Vec<f64> = Vec::new();
            for value in source
                .records()
                .iter()
                .filter_map(|record| record.value(index).as_numeric())
            {
                if !seen
                    .iter()
                    .any(|known| (known - value).abs() <= MATCH_TOLERANCE)
                {
                    seen.push(value);
                }
            }
            seen.into_iter().map(Value::Numeric).collect()
        }
    }
}
