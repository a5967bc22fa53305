use serde::{Deserialize, Serialize};

use crate::{hierarchy::HierarchyEdge, membership::Membership};

/// Every direct membership and hierarchy row visible to one transaction,
/// expired rows included. Expiry is applied by whoever reads it.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Snapshot {
    pub memberships: Vec<Membership>,
    pub edges: Vec<HierarchyEdge>,
}
