use serde::Serialize;
use tracing::warn;

use gim_storage::{
    group::Group, hierarchy::HierarchyEdge, membership::Membership,
    request::Request,
};
use gim_watch::Publisher;

pub const MEMBERSHIP_ADDED: &str = "membership.added";
pub const MEMBERSHIP_REMOVED: &str = "membership.removed";
pub const MEMBER_CREATED: &str = "member.created";
pub const MEMBER_UPDATED: &str = "member.updated";
pub const MEMBER_DELETED: &str = "member.deleted";
pub const HIERARCHY_CREATED: &str = "hierarchy.created";
pub const HIERARCHY_UPDATED: &str = "hierarchy.updated";
pub const HIERARCHY_DELETED: &str = "hierarchy.deleted";
pub const REQUEST_APPROVED: &str = "request.approved";
pub const REQUEST_DENIED: &str = "request.denied";
pub const GROUP_CREATED: &str = "group.created";
pub const GROUP_DELETED: &str = "group.deleted";

/// Payload published after a committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// One element of the effective membership diff.
    Membership { user_id: String, group_id: String },
    Member(Membership),
    Hierarchy(HierarchyEdge),
    Request(Request),
    Group(Group),
}

/// Attempts every event in order and returns how many were not delivered.
/// Each failure is logged as it happens.
pub(crate) async fn publish_all<P>(
    publisher: &P,
    events: &[(&'static str, Event)],
) -> usize
where
    P: Publisher<Event> + ?Sized,
{
    let mut failed = 0;
    for (subject, event) in events {
        if let Err(err) = publisher.publish(subject, event.clone()).await {
            warn!(subject, %err, "publish failed");
            failed += 1;
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;

    use gim_slo::{errors, Result};

    use super::*;

    #[derive(Default)]
    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Publisher<Event> for Flaky {
        async fn publish(&self, subject: &str, _event: Event) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if subject == MEMBERSHIP_REMOVED {
                return Err(errors::any(std::fmt::Error));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn every_event_is_attempted() {
        let publisher = Flaky::default();
        let event = Event::Membership {
            user_id: "1".to_owned(),
            group_id: "2".to_owned(),
        };
        let events = vec![
            (MEMBERSHIP_REMOVED, event.clone()),
            (MEMBERSHIP_ADDED, event.clone()),
            (MEMBERSHIP_REMOVED, event),
        ];
        assert_eq!(publish_all(&publisher, &events).await, 2);
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn wire_shape() {
        let value = serde_json::to_value(Event::Membership {
            user_id: "1".to_owned(),
            group_id: "2".to_owned(),
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"kind": "membership", "user_id": "1", "group_id": "2"})
        );
    }
}
