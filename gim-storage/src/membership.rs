use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A direct, explicitly held `(user, group)` edge.
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct Membership {
    pub user_id: String,
    pub group_id: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDateTime>,
}

impl Membership {
    /// Expired once `expires_at` is at or before `at`.
    pub fn is_live(&self, at: NaiveDateTime) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > at)
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct Content {
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    #[validate(length(min = 1, max = 255))]
    pub group_id: String,
    #[serde(default)]
    pub is_admin: bool,
    pub expires_at: Option<NaiveDateTime>,
}

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct UpdateOpts {
    pub is_admin: Option<bool>,
    pub expires_at: Option<NaiveDateTime>,
    /// Drops any expiry; wins over `expires_at`.
    #[serde(default)]
    pub clear_expiry: bool,
}

impl UpdateOpts {
    pub fn apply(&self, membership: &mut Membership) {
        if let Some(is_admin) = self.is_admin {
            membership.is_admin = is_admin;
        }
        if self.clear_expiry {
            membership.expires_at = None;
        } else if self.expires_at.is_some() {
            membership.expires_at = self.expires_at;
        }
    }
}
