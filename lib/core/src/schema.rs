//! Feature schema definitions
//!
//! A schema fixes, once per population, the id column and the ordered list of
//! features together with their kind. Records are checked against it before
//! anything is encoded, so a row whose shape drifted from its column's
//! declared kind is rejected instead of silently hashed.

use crate::error::SchemaError;
use crate::record::{FeatureRecord, FeatureValue};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Ordered feature layout shared by every record of a population
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureSchema {
    /// Name of the column holding entity ids
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Features in encoding order
    pub features: Vec<FeatureSpec>,
}

fn default_id_column() -> String {
    "id".to_string()
}

/// A single feature column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Scalar,
        }
    }

    pub fn multi(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::MultiValued,
        }
    }
}

/// Whether a column holds one value or a list of values per row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    #[default]
    Scalar,
    MultiValued,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Scalar => "scalar",
            FeatureKind::MultiValued => "multi-valued",
        }
    }

    fn admits(&self, value: &FeatureValue) -> bool {
        match self {
            FeatureKind::Scalar => !value.is_multi(),
            FeatureKind::MultiValued => value.is_multi(),
        }
    }
}

impl FeatureSchema {
    /// Create a schema and validate it
    pub fn new(id_column: impl Into<String>, features: Vec<FeatureSpec>) -> Result<Self, SchemaError> {
        let schema = Self {
            id_column: id_column.into(),
            features,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Check that the schema has features, no duplicate names and no feature
    /// shadowing the id column
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.features.is_empty() {
            return Err(SchemaError::EmptySchema);
        }

        let mut seen = AHashSet::with_capacity(self.features.len());
        for spec in &self.features {
            if spec.name == self.id_column {
                return Err(SchemaError::IdColumnIsFeature(spec.name.clone()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(SchemaError::DuplicateFeature(spec.name.clone()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// Position of a feature in encoding order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Names of the multi-valued columns
    pub fn multi_valued(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|f| f.kind == FeatureKind::MultiValued)
            .map(|f| f.name.as_str())
    }

    /// Check one record's arity and per-column kinds
    pub fn check_record(&self, record: &FeatureRecord) -> Result<(), SchemaError> {
        if record.values.len() != self.features.len() {
            return Err(SchemaError::Arity {
                entity: record.id.to_string(),
                expected: self.features.len(),
                actual: record.values.len(),
            });
        }

        for (spec, value) in self.features.iter().zip(&record.values) {
            if !spec.kind.admits(value) {
                return Err(SchemaError::KindMismatch {
                    entity: record.id.to_string(),
                    feature: spec.name.clone(),
                    expected: spec.kind.as_str(),
                });
            }
        }
        Ok(())
    }
}
