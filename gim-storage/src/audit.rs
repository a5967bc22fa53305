use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub before: Value,
    pub after: Value,
}
