use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde_json::Value;
use validator::Validate;

use gim_slo::{
    errors::{self, Code},
    next_id, Result,
};
use gim_storage::{
    group::{Content, Group},
    GraphStore, GraphTx,
};
use gim_watch::Publisher;

use super::{
    mutation::{execute, lock_existing, Applied, Mutation, Report},
    notify::{Event, GROUP_CREATED, GROUP_DELETED},
};

struct CreateGroup(Group);

#[async_trait]
impl Mutation for CreateGroup {
    fn action(&self) -> &'static str {
        "group.create"
    }

    async fn lock<T: GraphTx>(&self, _tx: &mut T) -> Result<()> {
        Ok(())
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        tx.put_group(&self.0).await?;
        Ok(Applied {
            before: Value::Null,
            after: serde_json::to_value(&self.0).map_err(errors::any)?,
            subject: GROUP_CREATED,
            event: Event::Group(self.0.clone()),
        })
    }
}

struct DeleteGroup<'a>(&'a str);

#[async_trait]
impl<'a> Mutation for DeleteGroup<'a> {
    fn action(&self) -> &'static str {
        "group.delete"
    }

    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        tx.lock_hierarchy().await?;
        lock_existing(tx, &[self.0]).await
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        at: NaiveDateTime,
    ) -> Result<Applied> {
        let mut group = tx
            .lock_groups(&[self.0.to_owned()])
            .await?
            .pop()
            .ok_or_else(|| errors::not_found(&format!("group {}", self.0)))?;
        let before = serde_json::to_value(&group).map_err(errors::any)?;
        tx.delete_group(self.0, at).await?;
        group.deleted_at = Some(at);
        group.updated_at = at;
        Ok(Applied {
            before,
            after: serde_json::to_value(&group).map_err(errors::any)?,
            subject: GROUP_DELETED,
            event: Event::Group(group),
        })
    }
}

/// Creates a group under a fresh id. The slug must be free among live
/// groups.
pub async fn create_group<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    content: &Content,
) -> Result<(Group, Report)>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
{
    content.validate().map_err(Code::Validates)?;
    let now = Utc::now().naive_utc();
    let group = Group {
        id: next_id()?.to_string(),
        slug: content.slug.clone(),
        name: content.name.clone(),
        description: content.description.clone(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    let mutation = CreateGroup(group);
    let report = execute(store, publisher, actor, &mutation).await?;
    Ok((mutation.0, report))
}

/// Soft-deletes the group together with its memberships, nesting edges
/// and pending requests. Every member loses every membership that flowed
/// through it.
pub async fn delete_group<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    id: &str,
) -> Result<Report>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
{
    execute(store, publisher, actor, &DeleteGroup(id)).await
}

#[cfg(test)]
mod tests {
    use gim_storage::{
        hierarchy::HierarchyEdge,
        membership::Membership,
        user::{User, UserStatus},
        MemoryStore,
    };
    use gim_watch::WatcherHub;

    use super::*;

    fn content(slug: &str) -> Content {
        Content {
            slug: slug.to_owned(),
            name: slug.to_owned(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn create_validates_and_rejects_taken_slug() {
        let store = MemoryStore::new();
        let hub = WatcherHub::default();
        let (group, _) = create_group(&store, &hub, "root", &content("ops"))
            .await
            .unwrap();
        assert!(store.group(&group.id).await.is_some());

        let err = create_group(&store, &hub, "root", &content("ops"))
            .await
            .unwrap_err();
        assert_eq!(err, errors::conflict("x"));

        let err = create_group(&store, &hub, "root", &content("Not A Slug"))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), Code::Validates(_)));
    }

    #[tokio::test]
    async fn delete_drops_inherited_memberships() {
        let store = MemoryStore::new();
        let hub = WatcherHub::default();
        let (root, _) = create_group(&store, &hub, "root", &content("root"))
            .await
            .unwrap();
        let (leaf, _) = create_group(&store, &hub, "root", &content("leaf"))
            .await
            .unwrap();
        store
            .insert_user(User {
                id: "1".to_owned(),
                status: UserStatus::Active,
            })
            .await;
        store
            .insert_membership(Membership {
                user_id: "1".to_owned(),
                group_id: leaf.id.clone(),
                ..Default::default()
            })
            .await;
        store
            .insert_edge(HierarchyEdge {
                parent_id: root.id.clone(),
                member_id: leaf.id.clone(),
                expires_at: None,
            })
            .await;

        let report = delete_group(&store, &hub, "root", &leaf.id).await.unwrap();
        assert_eq!(report.changes.removed.len(), 2);
        assert!(!store.group(&leaf.id).await.unwrap().is_live());

        let err = delete_group(&store, &hub, "root", &leaf.id)
            .await
            .unwrap_err();
        assert_eq!(err, errors::not_found("x"));
    }
}
