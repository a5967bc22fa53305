use std::collections::BTreeSet;

use chrono::{NaiveDateTime, Utc};
use tracing::debug;

use gim_graph::{closure, groups_of, members_of, Closure, Graph};
use gim_slo::Result;
use gim_storage::{GraphStore, GraphTx, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOpts {
    /// Count expired memberships and edges as live.
    pub include_expired: bool,
    pub at: NaiveDateTime,
}

impl Default for ResolveOpts {
    fn default() -> Self {
        Self::at(Utc::now().naive_utc())
    }
}

impl ResolveOpts {
    pub fn at(at: NaiveDateTime) -> Self {
        Self {
            include_expired: false,
            at,
        }
    }
}

type Direct = Vec<(String, String)>;

fn live(snapshot: &Snapshot, opts: &ResolveOpts) -> (Direct, Graph<String>) {
    let direct = snapshot
        .memberships
        .iter()
        .filter(|m| opts.include_expired || m.is_live(opts.at))
        .map(|m| (m.user_id.clone(), m.group_id.clone()))
        .collect();
    let graph = Graph::from_edges(
        snapshot
            .edges
            .iter()
            .filter(|e| opts.include_expired || e.is_live(opts.at))
            .map(|e| (e.parent_id.clone(), e.member_id.clone())),
    );
    (direct, graph)
}

/// Effective membership of every user at `opts.at`.
pub fn resolve_all(
    snapshot: &Snapshot,
    opts: &ResolveOpts,
) -> Closure<String, String> {
    let (direct, graph) = live(snapshot, opts);
    let out = closure(direct, &graph);
    debug!(
        memberships = snapshot.memberships.len(),
        edges = graph.edge_count(),
        effective = out.len(),
        "closure resolved"
    );
    out
}

pub fn resolve_for_user(
    snapshot: &Snapshot,
    user: &str,
    opts: &ResolveOpts,
) -> BTreeSet<String> {
    let (direct, graph) = live(snapshot, opts);
    let direct = direct.into_iter().filter(|(u, _)| u == user);
    groups_of(&closure(direct, &graph), user)
}

/// Users holding `group` directly or through any nested group.
pub fn resolve_for_group(
    snapshot: &Snapshot,
    group: &str,
    opts: &ResolveOpts,
) -> BTreeSet<String> {
    let (direct, graph) = live(snapshot, opts);
    members_of(direct, &graph, group)
}

pub async fn user_groups<S: GraphStore>(
    store: &S,
    user: &str,
    opts: &ResolveOpts,
) -> Result<BTreeSet<String>> {
    let mut tx = store.begin().await?;
    let snapshot = tx.snapshot().await;
    tx.rollback().await?;
    Ok(resolve_for_user(&snapshot?, user, opts))
}

pub async fn group_members<S: GraphStore>(
    store: &S,
    group: &str,
    opts: &ResolveOpts,
) -> Result<BTreeSet<String>> {
    let mut tx = store.begin().await?;
    let snapshot = tx.snapshot().await;
    tx.rollback().await?;
    Ok(resolve_for_group(&snapshot?, group, opts))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use gim_graph::Effective;
    use gim_storage::{hierarchy::HierarchyEdge, membership::Membership};

    use super::*;

    fn member(user: &str, group: &str) -> Membership {
        Membership {
            user_id: user.to_owned(),
            group_id: group.to_owned(),
            ..Default::default()
        }
    }

    fn edge(parent: &str, member: &str) -> HierarchyEdge {
        HierarchyEdge {
            parent_id: parent.to_owned(),
            member_id: member.to_owned(),
            expires_at: None,
        }
    }

    #[test]
    fn leaf_and_root() {
        let snapshot = Snapshot {
            memberships: vec![member("u", "leaf")],
            edges: vec![edge("root", "leaf")],
        };
        let opts = ResolveOpts::default();
        let all = resolve_all(&snapshot, &opts);
        assert_eq!(all.len(), 2);
        assert!(all.contains(&Effective {
            user: "u".to_owned(),
            group: "root".to_owned()
        }));
        assert_eq!(
            resolve_for_user(&snapshot, "u", &opts),
            BTreeSet::from(["leaf".to_owned(), "root".to_owned()])
        );
        assert_eq!(
            resolve_for_group(&snapshot, "root", &opts),
            BTreeSet::from(["u".to_owned()])
        );
        assert!(resolve_for_group(&snapshot, "other", &opts).is_empty());
    }

    #[test]
    fn expired_rows_filtered() {
        let now = Utc::now().naive_utc();
        let mut expired_edge = edge("root", "leaf");
        expired_edge.expires_at = Some(now - Duration::seconds(1));
        let mut expired_member = member("v", "leaf");
        expired_member.expires_at = Some(now);
        let snapshot = Snapshot {
            memberships: vec![member("u", "leaf"), expired_member],
            edges: vec![expired_edge],
        };

        let opts = ResolveOpts::at(now);
        assert_eq!(
            resolve_for_user(&snapshot, "u", &opts),
            BTreeSet::from(["leaf".to_owned()])
        );
        assert!(resolve_for_user(&snapshot, "v", &opts).is_empty());

        let opts = ResolveOpts {
            include_expired: true,
            at: now,
        };
        assert_eq!(resolve_all(&snapshot, &opts).len(), 4);
    }

    #[test]
    fn nested_diamond_dedups() {
        let snapshot = Snapshot {
            memberships: vec![member("u", "d")],
            edges: vec![edge("b", "d"), edge("c", "d"), edge("a", "b"), edge("a", "c")],
        };
        let groups = resolve_for_user(&snapshot, "u", &ResolveOpts::default());
        assert_eq!(groups.len(), 4);
    }
}
