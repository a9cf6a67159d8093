use crate::firestore::Document;

pub const FIELD_NICKNAME: &str = "nickname";
pub const FIELD_PUSH_TOKEN: &str = "pushToken";

/// The parts of a `users/{id}` document the relay cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub nickname: Option<String>,
    pub push_token: Option<String>,
}

impl UserProfile {
    /// Empty strings are treated the same as absent fields.
    pub fn from_document(doc: &Document) -> Self {
        let non_empty = |name: &str| {
            doc.string_field(name)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Self {
            nickname: non_empty(FIELD_NICKNAME),
            push_token: non_empty(FIELD_PUSH_TOKEN),
        }
    }
}
