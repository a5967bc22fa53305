use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use gim_slo::{errors, next_id, Result};

use crate::{
    audit::AuditEntry,
    group::Group,
    hierarchy::HierarchyEdge,
    membership::Membership,
    request::{Request, Subject},
    resource::{Definition, Resource},
    user::User,
    GraphStore, GraphTx, ResourceStore, Snapshot,
};

type Pair = (String, String);

#[derive(Debug, Default, Clone)]
struct State {
    groups: BTreeMap<String, Group>,
    users: BTreeMap<String, User>,
    memberships: BTreeMap<Pair, Membership>,
    edges: BTreeMap<Pair, HierarchyEdge>,
    requests: BTreeMap<String, Request>,
    audit: Vec<(String, AuditEntry)>,
    definitions: BTreeMap<String, Definition>,
    resources: BTreeMap<String, Resource>,
}

/// Process-local store. Transactions are serialized: `begin` holds the
/// whole state until the transaction commits or is dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_group(&self, group: Group) {
        self.state.lock().await.groups.insert(group.id.clone(), group);
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id.clone(), user);
    }

    pub async fn insert_membership(&self, membership: Membership) {
        self.state.lock().await.memberships.insert(
            (membership.user_id.clone(), membership.group_id.clone()),
            membership,
        );
    }

    pub async fn insert_edge(&self, edge: HierarchyEdge) {
        self.state.lock().await.edges.insert(
            (edge.parent_id.clone(), edge.member_id.clone()),
            edge,
        );
    }

    pub async fn insert_request(&self, request: Request) {
        self.state
            .lock()
            .await
            .requests
            .insert(request.id.clone(), request);
    }

    pub async fn insert_definition(&self, definition: Definition) {
        self.state
            .lock()
            .await
            .definitions
            .insert(definition.id.clone(), definition);
    }

    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.state
            .lock()
            .await
            .audit
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub async fn audit_entry(&self, id: &str) -> Option<AuditEntry> {
        self.state
            .lock()
            .await
            .audit
            .iter()
            .find(|(audit_id, _)| audit_id == id)
            .map(|(_, entry)| entry.clone())
    }

    pub async fn group(&self, id: &str) -> Option<Group> {
        self.state.lock().await.groups.get(id).cloned()
    }

    pub async fn request(&self, id: &str) -> Option<Request> {
        self.state.lock().await.requests.get(id).cloned()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }
}

/// Writes go to a private copy that replaces the shared state on commit.
#[derive(Debug)]
pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
}

impl MemoryTx {
    fn live_group(&self, id: &str) -> Option<&Group> {
        self.work.groups.get(id).filter(|group| group.is_live())
    }
}

#[async_trait]
impl GraphTx for MemoryTx {
    async fn lock_hierarchy(&mut self) -> Result<()> {
        Ok(())
    }

    async fn share_hierarchy(&mut self) -> Result<()> {
        Ok(())
    }

    async fn lock_groups(&mut self, ids: &[String]) -> Result<Vec<Group>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| self.live_group(id).cloned())
            .collect())
    }

    async fn snapshot(&mut self) -> Result<Snapshot> {
        Ok(Snapshot {
            memberships: self.work.memberships.values().cloned().collect(),
            edges: self.work.edges.values().cloned().collect(),
        })
    }

    async fn users(&mut self, ids: &[String]) -> Result<Vec<User>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.work.users.get(id).cloned())
            .collect())
    }

    async fn put_group(&mut self, group: &Group) -> Result<()> {
        if self
            .work
            .groups
            .values()
            .any(|g| g.is_live() && g.slug == group.slug && g.id != group.id)
        {
            return Err(errors::conflict(&format!(
                "slug {} already in use",
                group.slug
            )));
        }
        self.work.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn delete_group(
        &mut self,
        id: &str,
        at: NaiveDateTime,
    ) -> Result<()> {
        let group = self
            .work
            .groups
            .get_mut(id)
            .filter(|group| group.is_live())
            .ok_or_else(|| errors::not_found(&format!("group {}", id)))?;
        group.deleted_at = Some(at);
        group.updated_at = at;
        self.work.memberships.retain(|(_, group_id), _| group_id != id);
        self.work
            .edges
            .retain(|(parent_id, member_id), _| parent_id != id && member_id != id);
        self.work.requests.retain(|_, request| {
            request.group_id != id
                && request.subject != Subject::Group(id.to_owned())
        });
        Ok(())
    }

    async fn get_membership(
        &mut self,
        user_id: &str,
        group_id: &str,
    ) -> Result<Option<Membership>> {
        Ok(self
            .work
            .memberships
            .get(&(user_id.to_owned(), group_id.to_owned()))
            .cloned())
    }

    async fn put_membership(&mut self, membership: &Membership) -> Result<()> {
        self.work.memberships.insert(
            (membership.user_id.clone(), membership.group_id.clone()),
            membership.clone(),
        );
        Ok(())
    }

    async fn delete_membership(
        &mut self,
        user_id: &str,
        group_id: &str,
    ) -> Result<bool> {
        Ok(self
            .work
            .memberships
            .remove(&(user_id.to_owned(), group_id.to_owned()))
            .is_some())
    }

    async fn get_edge(
        &mut self,
        parent_id: &str,
        member_id: &str,
    ) -> Result<Option<HierarchyEdge>> {
        Ok(self
            .work
            .edges
            .get(&(parent_id.to_owned(), member_id.to_owned()))
            .cloned())
    }

    async fn put_edge(&mut self, edge: &HierarchyEdge) -> Result<()> {
        self.work.edges.insert(
            (edge.parent_id.clone(), edge.member_id.clone()),
            edge.clone(),
        );
        Ok(())
    }

    async fn delete_edge(
        &mut self,
        parent_id: &str,
        member_id: &str,
    ) -> Result<bool> {
        Ok(self
            .work
            .edges
            .remove(&(parent_id.to_owned(), member_id.to_owned()))
            .is_some())
    }

    async fn lock_request(&mut self, id: &str) -> Result<Option<Request>> {
        Ok(self.work.requests.get(id).cloned())
    }

    async fn delete_request(&mut self, id: &str) -> Result<()> {
        self.work.requests.remove(id);
        Ok(())
    }

    async fn record_audit(&mut self, entry: &AuditEntry) -> Result<String> {
        let id = next_id()?.to_string();
        self.work.audit.push((id.clone(), entry.clone()));
        Ok(id)
    }

    async fn commit(self) -> Result<()> {
        let MemoryTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_definition(&self, id: &str) -> Result<Definition> {
        self.state
            .lock()
            .await
            .definitions
            .get(id)
            .cloned()
            .ok_or_else(|| errors::not_found(&format!("definition {}", id)))
    }

    async fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        Ok(self
            .state
            .lock()
            .await
            .resources
            .get(id)
            .filter(|resource| resource.deleted_at.is_none())
            .cloned())
    }

    async fn create_resource(&self, resource: &Resource) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.resources.contains_key(&resource.id) {
            return Err(errors::conflict(&format!(
                "resource {} already exists",
                resource.id
            )));
        }
        state.resources.insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn conditional_update(
        &self,
        id: &str,
        expected: u64,
        payload: &Value,
        version: u64,
        updated_at: NaiveDateTime,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        match state.resources.get_mut(id) {
            Some(resource)
                if resource.deleted_at.is_none()
                    && resource.resource_version == expected =>
            {
                resource.payload = payload.clone();
                resource.resource_version = version;
                resource.updated_at = updated_at;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn conditional_delete(
        &self,
        id: &str,
        expected: u64,
        at: NaiveDateTime,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        match state.resources.get_mut(id) {
            Some(resource)
                if resource.deleted_at.is_none()
                    && resource.resource_version == expected =>
            {
                resource.deleted_at = Some(at);
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}
