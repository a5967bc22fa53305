use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    #[default]
    Inactive,
}

impl UserStatus {
    /// Anything other than `active` is treated as inactive.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("active") {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct User {
    pub id: String,
    pub status: UserStatus,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}
