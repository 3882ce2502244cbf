//! Validated in-memory table of feature records.

use crate::error::{Result, SchemaError};
use crate::record::{EntityId, FeatureRecord, FeatureValue, Scalar};
use crate::schema::{FeatureKind, FeatureSchema};
use ahash::{AHashMap, AHashSet};
use serde_json::Value;

/// All entities of one index build. Every record has been checked against the
/// schema and ids are unique.
#[derive(Debug, Clone)]
pub struct Population {
    schema: FeatureSchema,
    records: Vec<FeatureRecord>,
    by_id: AHashMap<EntityId, usize>,
}

impl Population {
    /// Build a population from typed records
    pub fn new(schema: FeatureSchema, records: Vec<FeatureRecord>) -> Result<Self> {
        schema.validate()?;

        let mut by_id = AHashMap::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            schema.check_record(record)?;
            if by_id.insert(record.id.clone(), row).is_some() {
                return Err(SchemaError::DuplicateId(record.id.to_string()).into());
            }
        }

        Ok(Self {
            schema,
            records,
            by_id,
        })
    }

    /// Build a population from JSON objects keyed by column name
    pub fn from_json_rows<'a, I>(schema: FeatureSchema, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        schema.validate()?;
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(row, value)| record_from_json(&schema, row, value))
            .collect::<std::result::Result<Vec<_>, SchemaError>>()?;
        Self::new(schema, records)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn get(&self, id: &EntityId) -> Option<&FeatureRecord> {
        self.by_id.get(id).map(|&row| &self.records[row])
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Records for the given ids that exist in the population, in the order
    /// first requested. Unknown ids are ignored and repeated ids are taken
    /// once.
    pub fn subset<'a, I>(&self, ids: I) -> Vec<&FeatureRecord>
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        let mut seen = AHashSet::new();
        ids.into_iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.get(id))
            .collect()
    }
}

fn record_from_json(
    schema: &FeatureSchema,
    row: usize,
    value: &Value,
) -> std::result::Result<FeatureRecord, SchemaError> {
    let object = value.as_object().ok_or(SchemaError::NotAnObject { row })?;

    let id = match object.get(&schema.id_column) {
        None | Some(Value::Null) => {
            return Err(SchemaError::MissingId {
                row,
                column: schema.id_column.clone(),
            })
        }
        Some(Value::String(s)) => EntityId::String(s.clone()),
        Some(Value::Number(n)) => n.as_u64().map(EntityId::Integer).ok_or_else(|| SchemaError::InvalidId {
            row,
            column: schema.id_column.clone(),
        })?,
        Some(_) => {
            return Err(SchemaError::InvalidId {
                row,
                column: schema.id_column.clone(),
            })
        }
    };

    let mut values = Vec::with_capacity(schema.features.len());
    for spec in &schema.features {
        let cell = object.get(&spec.name).ok_or_else(|| SchemaError::MissingFeature {
            entity: id.to_string(),
            feature: spec.name.clone(),
        })?;

        let unsupported = || SchemaError::UnsupportedValue {
            entity: id.to_string(),
            feature: spec.name.clone(),
        };
        let mismatch = || SchemaError::KindMismatch {
            entity: id.to_string(),
            feature: spec.name.clone(),
            expected: spec.kind.as_str(),
        };

        let feature_value = match (spec.kind, cell) {
            (FeatureKind::MultiValued, Value::Array(items)) => FeatureValue::Multi(
                items
                    .iter()
                    .map(|item| Scalar::from_json(item).ok_or_else(unsupported))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            ),
            (FeatureKind::MultiValued, _) => return Err(mismatch()),
            (FeatureKind::Scalar, Value::Array(_)) => return Err(mismatch()),
            (FeatureKind::Scalar, other) => {
                FeatureValue::Scalar(Scalar::from_json(other).ok_or_else(unsupported)?)
            }
        };
        values.push(feature_value);
    }

    Ok(FeatureRecord { id, values })
}
