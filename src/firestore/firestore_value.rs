use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::str::FromStr;

/// A Firestore typed value as returned by the REST API.
///
/// Each value is a single-key JSON object naming its type, e.g.
/// `{"stringValue": "hi"}` or `{"integerValue": "1700000000000"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(#[serde(deserialize_with = "lenient_number")] i64),
    DoubleValue(#[serde(deserialize_with = "lenient_number")] f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(serde_json::Value),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::StringValue(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::NullValue(_) => "null",
            Value::BooleanValue(_) => "boolean",
            Value::IntegerValue(_) => "integer",
            Value::DoubleValue(_) => "double",
            Value::TimestampValue(_) => "timestamp",
            Value::StringValue(_) => "string",
            Value::BytesValue(_) => "bytes",
            Value::ReferenceValue(_) => "reference",
            Value::GeoPointValue(_) => "geo point",
            Value::ArrayValue(_) => "array",
            Value::MapValue(_) => "map",
        }
    }
}

// int64 values travel as JSON strings; doubles may be "NaN" or "Infinity".
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberRepr<T> {
    Number(T),
    Text(String),
}

fn lenient_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
{
    match NumberRepr::<T>::deserialize(deserializer)? {
        NumberRepr::Number(n) => Ok(n),
        NumberRepr::Text(s) => s
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {}", s))),
    }
}

/// A stored document: its full resource name, fields and last update time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default)]
    pub update_time: Option<String>,
}

impl Document {
    /// The last path segment of the resource name.
    pub fn id(&self) -> &str {
        document_id(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn string_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

/// Last path segment of a full document resource name.
pub fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
