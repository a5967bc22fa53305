use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// `member_id` is nested in `parent_id`: members of the former are members
/// of the latter.
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct HierarchyEdge {
    pub parent_id: String,
    pub member_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDateTime>,
}

impl HierarchyEdge {
    pub fn is_live(&self, at: NaiveDateTime) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > at)
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct Content {
    #[validate(length(min = 1, max = 255))]
    pub parent_id: String,
    #[validate(length(min = 1, max = 255))]
    pub member_id: String,
    pub expires_at: Option<NaiveDateTime>,
}

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct UpdateOpts {
    pub expires_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub clear_expiry: bool,
}

impl UpdateOpts {
    pub fn apply(&self, edge: &mut HierarchyEdge) {
        if self.clear_expiry {
            edge.expires_at = None;
        } else if self.expires_at.is_some() {
            edge.expires_at = self.expires_at;
        }
    }
}
