use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Who asked to join: a user for a direct membership, a group for a
/// hierarchy edge.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    User(String),
    Group(String),
}

impl Subject {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Group(id) => id,
        }
    }
}

/// A pending request to join `group_id`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Request {
    pub id: String,
    pub group_id: String,
    pub subject: Subject,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_wire_shape() {
        let subject = Subject::Group("42".to_owned());
        let value = serde_json::to_value(&subject).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "group", "id": "42"}));
        assert_eq!(subject.kind(), "group");
        assert_eq!(subject.id(), "42");
    }
}
