use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gim_slo::{errors, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    User,
    System,
}

impl Scope {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            v => Err(errors::bad_request(&format!("unknown scope {}", v))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

/// Extension resource definition: the schema every payload of the kind
/// must satisfy, and who administers it.
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct Definition {
    pub id: String,
    pub name: String,
    pub schema: Value,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_group: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
    User(String),
    Group(String),
}

impl Owner {
    /// Decodes a raw owner reference such as `{"kind":"group","id":"7"}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        Owner::deserialize(value).map_err(|err| {
            errors::bad_request(&format!("malformed owner reference: {}", err))
        })
    }

    pub fn from_parts(kind: &str, id: String) -> Result<Self> {
        match kind {
            "user" => Ok(Self::User(id)),
            "group" => Ok(Self::Group(id)),
            v => Err(errors::bad_request(&format!("unknown owner kind {}", v))),
        }
    }

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

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct Resource {
    pub id: String,
    pub definition_id: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    pub resource_version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<NaiveDateTime>,
}

/// Outcome of a successful conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Updated {
    pub resource_version: u64,
    pub updated_at: NaiveDateTime,
}
