use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::warn;
use validator::Validate;

use gim_graph::{cycle_path, Graph};
use gim_slo::{
    errors::{self, Code},
    Result,
};
use gim_storage::{
    hierarchy::{Content, HierarchyEdge, UpdateOpts},
    GraphStore, GraphTx, Snapshot,
};
use gim_watch::Publisher;

use super::{
    mutation::{execute, lock_existing, Applied, Mutation, Report},
    notify::{Event, HIERARCHY_CREATED, HIERARCHY_DELETED, HIERARCHY_UPDATED},
};

/// Every stored edge, expired or not, takes part in cycle checks.
fn full_graph(snapshot: &Snapshot) -> Graph<String> {
    Graph::from_edges(
        snapshot
            .edges
            .iter()
            .map(|edge| (edge.parent_id.clone(), edge.member_id.clone())),
    )
}

/// Whether nesting `member` inside `parent` would close a loop in the
/// hierarchy held by `snapshot`.
pub fn would_create_cycle(
    snapshot: &Snapshot,
    parent: &str,
    member: &str,
) -> bool {
    gim_graph::would_create_cycle(&full_graph(snapshot), parent, member)
}

/// Read-only variant of [`would_create_cycle`] against the current store.
pub async fn check_cycle<S: GraphStore>(
    store: &S,
    parent: &str,
    member: &str,
) -> Result<bool> {
    let mut tx = store.begin().await?;
    let snapshot = tx.snapshot().await;
    tx.rollback().await?;
    Ok(would_create_cycle(&snapshot?, parent, member))
}

/// Inserts a hierarchy edge. The hierarchy lock and both group rows must
/// already be held.
pub(crate) async fn insert_edge<T: GraphTx>(
    tx: &mut T,
    edge: &HierarchyEdge,
) -> Result<()> {
    if tx
        .get_edge(&edge.parent_id, &edge.member_id)
        .await?
        .is_some()
    {
        return Err(errors::conflict(&format!(
            "group {} is already nested in group {}",
            edge.member_id, edge.parent_id
        )));
    }
    let graph = full_graph(&tx.snapshot().await?);
    if let Some(path) =
        cycle_path(&graph, edge.parent_id.as_str(), edge.member_id.as_str())
    {
        let path = path.join(" -> ");
        warn!(%path, "hierarchy cycle rejected");
        return Err(errors::conflict(&format!(
            "nesting group {} in group {} would create the cycle {}",
            edge.member_id, edge.parent_id, path
        )));
    }
    tx.put_edge(edge).await
}

async fn lock_pair<T: GraphTx>(
    tx: &mut T,
    parent_id: &str,
    member_id: &str,
) -> Result<()> {
    tx.lock_hierarchy().await?;
    lock_existing(tx, &[parent_id, member_id]).await
}

async fn existing<T: GraphTx>(
    tx: &mut T,
    parent_id: &str,
    member_id: &str,
) -> Result<HierarchyEdge> {
    tx.get_edge(parent_id, member_id).await?.ok_or_else(|| {
        errors::not_found(&format!(
            "group {} is not nested in group {}",
            member_id, parent_id
        ))
    })
}

fn to_value(edge: &HierarchyEdge) -> Result<Value> {
    serde_json::to_value(edge).map_err(errors::any)
}

struct AddEdge<'a>(&'a Content);

#[async_trait]
impl<'a> Mutation for AddEdge<'a> {
    fn action(&self) -> &'static str {
        "hierarchy.add"
    }

    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        lock_pair(tx, &self.0.parent_id, &self.0.member_id).await
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        let edge = HierarchyEdge {
            parent_id: self.0.parent_id.clone(),
            member_id: self.0.member_id.clone(),
            expires_at: self.0.expires_at,
        };
        insert_edge(tx, &edge).await?;
        Ok(Applied {
            before: Value::Null,
            after: to_value(&edge)?,
            subject: HIERARCHY_CREATED,
            event: Event::Hierarchy(edge),
        })
    }
}

struct UpdateEdge<'a> {
    parent_id: &'a str,
    member_id: &'a str,
    opts: &'a UpdateOpts,
}

#[async_trait]
impl<'a> Mutation for UpdateEdge<'a> {
    fn action(&self) -> &'static str {
        "hierarchy.update"
    }

    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        lock_pair(tx, self.parent_id, self.member_id).await
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        let before = existing(tx, self.parent_id, self.member_id).await?;
        let mut after = before.clone();
        self.opts.apply(&mut after);
        tx.put_edge(&after).await?;
        Ok(Applied {
            before: to_value(&before)?,
            after: to_value(&after)?,
            subject: HIERARCHY_UPDATED,
            event: Event::Hierarchy(after),
        })
    }
}

struct RemoveEdge<'a> {
    parent_id: &'a str,
    member_id: &'a str,
}

#[async_trait]
impl<'a> Mutation for RemoveEdge<'a> {
    fn action(&self) -> &'static str {
        "hierarchy.remove"
    }

    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        lock_pair(tx, self.parent_id, self.member_id).await
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        let before = existing(tx, self.parent_id, self.member_id).await?;
        tx.delete_edge(self.parent_id, self.member_id).await?;
        Ok(Applied {
            before: to_value(&before)?,
            after: Value::Null,
            subject: HIERARCHY_DELETED,
            event: Event::Hierarchy(before),
        })
    }
}

pub async fn link<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    content: &Content,
) -> Result<Report>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
{
    content.validate().map_err(Code::Validates)?;
    execute(store, publisher, actor, &AddEdge(content)).await
}

pub async fn update_link<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    parent_id: &str,
    member_id: &str,
    opts: &UpdateOpts,
) -> Result<Report>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
{
    opts.validate().map_err(Code::Validates)?;
    execute(
        store,
        publisher,
        actor,
        &UpdateEdge {
            parent_id,
            member_id,
            opts,
        },
    )
    .await
}

pub async fn unlink<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    parent_id: &str,
    member_id: &str,
) -> Result<Report>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
{
    execute(
        store,
        publisher,
        actor,
        &RemoveEdge {
            parent_id,
            member_id,
        },
    )
    .await
}
