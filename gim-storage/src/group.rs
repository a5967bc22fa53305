use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use gim_slo::regexp::check_slug;

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct Group {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<NaiveDateTime>,
}

impl Group {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct Content {
    #[validate(custom(function = "check_slug"))]
    pub slug: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub description: String,
}
