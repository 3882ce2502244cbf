use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one entity in the population.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Integer(u64),
    String(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Integer(i) => write!(f, "{}", i),
            EntityId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for EntityId {
    fn from(i: u64) -> Self {
        EntityId::Integer(i)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId::String(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::String(s.to_string())
    }
}

/// A single scalar feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Convert a non-container JSON value. Arrays and objects yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Integer)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// The string form of a scalar is its token.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// Value held by one feature of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Scalar(Scalar),
    Multi(Vec<Scalar>),
}

impl FeatureValue {
    #[inline]
    pub fn is_multi(&self) -> bool {
        matches!(self, FeatureValue::Multi(_))
    }

    /// Every scalar this value contributes, in order.
    pub fn scalars(&self) -> &[Scalar] {
        match self {
            FeatureValue::Scalar(s) => std::slice::from_ref(s),
            FeatureValue::Multi(values) => values,
        }
    }

    pub fn multi<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        FeatureValue::Multi(values.into_iter().map(Into::into).collect())
    }
}

impl From<Scalar> for FeatureValue {
    fn from(s: Scalar) -> Self {
        FeatureValue::Scalar(s)
    }
}

macro_rules! scalar_feature_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FeatureValue {
                fn from(v: $t) -> Self {
                    FeatureValue::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

scalar_feature_from!(&str, String, i64, f64, bool);

/// One entity's row: an id plus values ordered as the schema's features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: EntityId,
    pub values: Vec<FeatureValue>,
}

impl FeatureRecord {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<EntityId>, values: Vec<FeatureValue>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Number of tokens the record contributes to its signature
    pub fn token_count(&self) -> usize {
        self.values.iter().map(|v| v.scalars().len()).sum()
    }
}
