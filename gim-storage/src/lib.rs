pub mod audit;
pub mod group;
pub mod hierarchy;
mod mariadb;
pub mod membership;
mod memory;
mod model;
mod pool;
pub mod request;
pub mod resource;
pub mod user;

pub use mariadb::{MariadbStore, MariadbTx};
pub use memory::{MemoryStore, MemoryTx};
pub use model::Snapshot;
pub use pool::connection_manager;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::automock;
use serde_json::Value;

use gim_slo::Result;

use crate::{
    audit::AuditEntry,
    group::Group,
    hierarchy::HierarchyEdge,
    membership::Membership,
    request::Request,
    resource::{Definition, Resource},
    user::User,
};

/// Opens transactions over the membership graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    type Tx: GraphTx;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// One open transaction. Dropping it without `commit` rolls back.
#[async_trait]
pub trait GraphTx: Send {
    /// Serializes hierarchy writers for the rest of the transaction.
    async fn lock_hierarchy(&mut self) -> Result<()>;
    /// Shared hold on the same sentinel: excludes hierarchy writers but not
    /// other holders. Membership writers take it so their closures see every
    /// committed edge.
    async fn share_hierarchy(&mut self) -> Result<()>;
    /// Locks the live groups among `ids` and returns them, missing ones
    /// omitted.
    async fn lock_groups(&mut self, ids: &[String]) -> Result<Vec<Group>>;
    async fn snapshot(&mut self) -> Result<Snapshot>;
    async fn users(&mut self, ids: &[String]) -> Result<Vec<User>>;

    async fn put_group(&mut self, group: &Group) -> Result<()>;
    /// Soft-deletes the group and drops every membership, edge and pending
    /// request referencing it.
    async fn delete_group(&mut self, id: &str, at: NaiveDateTime)
        -> Result<()>;

    async fn get_membership(
        &mut self,
        user_id: &str,
        group_id: &str,
    ) -> Result<Option<Membership>>;
    async fn put_membership(&mut self, membership: &Membership) -> Result<()>;
    async fn delete_membership(
        &mut self,
        user_id: &str,
        group_id: &str,
    ) -> Result<bool>;

    async fn get_edge(
        &mut self,
        parent_id: &str,
        member_id: &str,
    ) -> Result<Option<HierarchyEdge>>;
    async fn put_edge(&mut self, edge: &HierarchyEdge) -> Result<()>;
    async fn delete_edge(
        &mut self,
        parent_id: &str,
        member_id: &str,
    ) -> Result<bool>;

    /// Reads and locks a pending request.
    async fn lock_request(&mut self, id: &str) -> Result<Option<Request>>;
    async fn delete_request(&mut self, id: &str) -> Result<()>;

    /// Returns the audit id.
    async fn record_audit(&mut self, entry: &AuditEntry) -> Result<String>;

    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// Extension resources and their definitions.
#[automock]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_definition(&self, id: &str) -> Result<Definition>;
    async fn get_resource(&self, id: &str) -> Result<Option<Resource>>;
    async fn create_resource(&self, resource: &Resource) -> Result<()>;
    /// Writes `payload` at `version` only while the stored version still
    /// equals `expected`. Returns the number of rows written.
    async fn conditional_update(
        &self,
        id: &str,
        expected: u64,
        payload: &Value,
        version: u64,
        updated_at: NaiveDateTime,
    ) -> Result<u64>;
    async fn conditional_delete(
        &self,
        id: &str,
        expected: u64,
        at: NaiveDateTime,
    ) -> Result<u64>;
}
