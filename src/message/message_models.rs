use crate::firestore::{Document, Value};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const FIELD_ID_FROM: &str = "idFrom";
pub const FIELD_ID_TO: &str = "idTo";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Fields the relay reads from a message document.
pub const MESSAGE_FIELDS: [&str; 4] = [FIELD_ID_FROM, FIELD_ID_TO, FIELD_CONTENT, FIELD_TIMESTAMP];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Removed => write!(f, "removed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub doc_id: String,
    pub message: Message,
}

pub type ChangeBatch = Vec<ChangeEvent>;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id_from: String,
    pub id_to: String,
    pub content: String,
    pub timestamp: RawTimestamp,
}

impl Message {
    /// Missing string fields decode as empty strings.
    pub fn from_document(doc: &Document) -> Self {
        let text = |name: &str| doc.string_field(name).unwrap_or_default().to_string();

        Self {
            id_from: text(FIELD_ID_FROM),
            id_to: text(FIELD_ID_TO),
            content: text(FIELD_CONTENT),
            timestamp: RawTimestamp::from_value(doc.field(FIELD_TIMESTAMP)),
        }
    }
}

/// The `timestamp` field exactly as the writer stored it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    IntegerMillis(i64),
    NumericString(String),
    Structured(DateTime<Utc>),
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported timestamp format: {0}")]
pub struct UnsupportedTimestamp(pub String);

impl RawTimestamp {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None => RawTimestamp::Unsupported("missing".to_string()),
            Some(Value::IntegerValue(millis)) => RawTimestamp::IntegerMillis(*millis),
            // Rounded up: with a whole-millisecond epoch, ceil(v) > epoch iff v > epoch.
            Some(Value::DoubleValue(millis)) if millis.is_finite() => {
                RawTimestamp::IntegerMillis(millis.ceil() as i64)
            }
            Some(Value::StringValue(s)) => RawTimestamp::NumericString(s.clone()),
            Some(Value::TimestampValue(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => RawTimestamp::Structured(dt.with_timezone(&Utc)),
                Err(_) => RawTimestamp::Unsupported(format!("malformed timestamp {:?}", s)),
            },
            Some(other) => RawTimestamp::Unsupported(other.type_name().to_string()),
        }
    }

    pub fn to_epoch_millis(&self) -> Result<i64, UnsupportedTimestamp> {
        match self {
            RawTimestamp::IntegerMillis(millis) => Ok(*millis),
            RawTimestamp::NumericString(s) => leading_integer(s)
                .ok_or_else(|| UnsupportedTimestamp(format!("non-numeric string {:?}", s))),
            RawTimestamp::Structured(dt) => Ok(dt.timestamp_millis()),
            RawTimestamp::Unsupported(description) => Err(UnsupportedTimestamp(description.clone())),
        }
    }
}

/// Reads the integer prefix of `s`: optional sign then digits, anything after is ignored.
fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let digits_start = usize::from(s.starts_with(['+', '-']));
    let digits_end = s[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |i| digits_start + i);

    if digits_end == digits_start {
        return None;
    }
    s[..digits_end].parse().ok()
}
