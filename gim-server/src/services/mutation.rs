use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use gim_graph::{diff, Changes, Effective};
use gim_slo::{errors, Result};
use gim_storage::{audit::AuditEntry, GraphStore, GraphTx};
use gim_watch::Publisher;

use super::{
    notify::{publish_all, Event, MEMBERSHIP_ADDED, MEMBERSHIP_REMOVED},
    resolver::{resolve_all, ResolveOpts},
};

/// What a mutation did, as recorded in the audit entry and announced under
/// `subject`.
#[derive(Debug)]
pub struct Applied {
    pub before: Value,
    pub after: Value,
    pub subject: &'static str,
    pub event: Event,
}

/// One membership-affecting change, run inside [`execute`].
#[async_trait]
pub trait Mutation: Send + Sync {
    fn action(&self) -> &'static str;

    /// Takes the row locks the change depends on. Runs before the first
    /// snapshot.
    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()>;

    /// Validates and writes the change.
    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        at: NaiveDateTime,
    ) -> Result<Applied>;
}

#[derive(Debug)]
pub struct Report {
    pub audit_id: String,
    pub changes: Changes<Effective<String, String>>,
    /// Membership-changed events sent. Changes of inactive users are
    /// reported but not published.
    pub published: usize,
}

struct Staged {
    audit_id: String,
    changes: Changes<Effective<String, String>>,
    active: BTreeSet<String>,
    subject: &'static str,
    event: Event,
}

/// Locks the live groups among `ids`, failing when any is missing.
pub(crate) async fn lock_existing<T: GraphTx>(
    tx: &mut T,
    ids: &[&str],
) -> Result<()> {
    let ids: Vec<String> = ids.iter().map(|id| (*id).to_owned()).collect();
    let found = tx.lock_groups(&ids).await?;
    for id in ids.iter() {
        if !found.iter().any(|group| &group.id == id) {
            return Err(errors::not_found(&format!("group {}", id)));
        }
    }
    Ok(())
}

async fn stage<T, M>(tx: &mut T, actor: &str, mutation: &M) -> Result<Staged>
where
    T: GraphTx,
    M: Mutation,
{
    let at = Utc::now().naive_utc();
    let opts = ResolveOpts::at(at);

    mutation.lock(tx).await?;
    let before = resolve_all(&tx.snapshot().await?, &opts);
    let applied = mutation.apply(tx, at).await?;
    let after = resolve_all(&tx.snapshot().await?, &opts);

    let audit_id = tx
        .record_audit(&AuditEntry {
            actor: actor.to_owned(),
            action: mutation.action().to_owned(),
            before: applied.before,
            after: applied.after,
        })
        .await?;

    let changes = diff(&before, &after);
    let touched: Vec<String> = changes
        .added
        .iter()
        .chain(changes.removed.iter())
        .map(|item| item.user.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let active = tx
        .users(&touched)
        .await?
        .into_iter()
        .filter(|user| user.is_active())
        .map(|user| user.id)
        .collect();

    Ok(Staged {
        audit_id,
        changes,
        active,
        subject: applied.subject,
        event: applied.event,
    })
}

/// Snapshots, applies, re-snapshots and audits `mutation` in one
/// transaction, then publishes the structural event and one event per
/// effective membership change.
///
/// Any failure before commit rolls back. A publish failure after commit
/// becomes [`errors::Code::PublishFailed`], which carries the audit id of
/// the committed change.
#[tracing::instrument(skip(store, publisher, mutation), fields(action = mutation.action()))]
pub async fn execute<S, P, M>(
    store: &S,
    publisher: &P,
    actor: &str,
    mutation: &M,
) -> Result<Report>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
    M: Mutation,
{
    let mut tx = store.begin().await?;
    let staged = match stage(&mut tx, actor, mutation).await {
        Ok(staged) => staged,
        Err(err) => {
            warn!(%err, "mutation rejected");
            if let Err(rollback) = tx.rollback().await {
                warn!(err = %rollback, "rollback failed");
            }
            return Err(err);
        }
    };
    tx.commit().await?;
    info!(
        audit_id = %staged.audit_id,
        added = staged.changes.added.len(),
        removed = staged.changes.removed.len(),
        "mutation committed"
    );

    let mut events = vec![(staged.subject, staged.event)];
    let membership = |subject: &'static str, item: &Effective<String, String>| {
        (
            subject,
            Event::Membership {
                user_id: item.user.clone(),
                group_id: item.group.clone(),
            },
        )
    };
    events.extend(
        staged
            .changes
            .added
            .iter()
            .filter(|item| staged.active.contains(&item.user))
            .map(|item| membership(MEMBERSHIP_ADDED, item)),
    );
    events.extend(
        staged
            .changes
            .removed
            .iter()
            .filter(|item| staged.active.contains(&item.user))
            .map(|item| membership(MEMBERSHIP_REMOVED, item)),
    );
    let undelivered = publish_all(publisher, &events).await;
    if undelivered > 0 {
        return Err(errors::publish_failed(
            &staged.audit_id,
            undelivered,
            events.len(),
        ));
    }

    Ok(Report {
        audit_id: staged.audit_id,
        changes: staged.changes,
        published: events.len() - 1,
    })
}
