use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use validator::Validate;

use gim_slo::{
    errors::{self, Code},
    Result,
};
use gim_storage::{
    membership::{Content, Membership, UpdateOpts},
    GraphStore, GraphTx,
};
use gim_watch::Publisher;

use super::{
    mutation::{execute, lock_existing, Applied, Mutation, Report},
    notify::{Event, MEMBER_CREATED, MEMBER_DELETED, MEMBER_UPDATED},
};

/// Inserts a direct membership. The group must already be locked.
pub(crate) async fn insert_membership<T: GraphTx>(
    tx: &mut T,
    membership: &Membership,
) -> Result<()> {
    if tx
        .users(&[membership.user_id.clone()])
        .await?
        .is_empty()
    {
        return Err(errors::not_found(&format!(
            "user {}",
            membership.user_id
        )));
    }
    if tx
        .get_membership(&membership.user_id, &membership.group_id)
        .await?
        .is_some()
    {
        return Err(errors::conflict(&format!(
            "user {} is already a member of group {}",
            membership.user_id, membership.group_id
        )));
    }
    tx.put_membership(membership).await
}

async fn existing<T: GraphTx>(
    tx: &mut T,
    user_id: &str,
    group_id: &str,
) -> Result<Membership> {
    tx.get_membership(user_id, group_id).await?.ok_or_else(|| {
        errors::not_found(&format!(
            "user {} is not a member of group {}",
            user_id, group_id
        ))
    })
}

/// Direct memberships feed every ancestor's closure, so hierarchy writers
/// must be held off while the group is changed.
async fn lock_group<T: GraphTx>(tx: &mut T, group_id: &str) -> Result<()> {
    tx.share_hierarchy().await?;
    lock_existing(tx, &[group_id]).await
}

fn to_value(membership: &Membership) -> Result<Value> {
    serde_json::to_value(membership).map_err(errors::any)
}

struct AddMember<'a>(&'a Content);

#[async_trait]
impl<'a> Mutation for AddMember<'a> {
    fn action(&self) -> &'static str {
        "membership.add"
    }

    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        lock_group(tx, &self.0.group_id).await
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        let membership = Membership {
            user_id: self.0.user_id.clone(),
            group_id: self.0.group_id.clone(),
            is_admin: self.0.is_admin,
            expires_at: self.0.expires_at,
        };
        insert_membership(tx, &membership).await?;
        Ok(Applied {
            before: Value::Null,
            after: to_value(&membership)?,
            subject: MEMBER_CREATED,
            event: Event::Member(membership),
        })
    }
}

struct UpdateMember<'a> {
    user_id: &'a str,
    group_id: &'a str,
    opts: &'a UpdateOpts,
}

#[async_trait]
impl<'a> Mutation for UpdateMember<'a> {
    fn action(&self) -> &'static str {
        "membership.update"
    }

    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        lock_group(tx, self.group_id).await
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        let before = existing(tx, self.user_id, self.group_id).await?;
        let mut after = before.clone();
        self.opts.apply(&mut after);
        tx.put_membership(&after).await?;
        Ok(Applied {
            before: to_value(&before)?,
            after: to_value(&after)?,
            subject: MEMBER_UPDATED,
            event: Event::Member(after),
        })
    }
}

struct RemoveMember<'a> {
    user_id: &'a str,
    group_id: &'a str,
}

#[async_trait]
impl<'a> Mutation for RemoveMember<'a> {
    fn action(&self) -> &'static str {
        "membership.remove"
    }

    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        lock_group(tx, self.group_id).await
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        let before = existing(tx, self.user_id, self.group_id).await?;
        tx.delete_membership(self.user_id, self.group_id).await?;
        Ok(Applied {
            before: to_value(&before)?,
            after: Value::Null,
            subject: MEMBER_DELETED,
            event: Event::Member(before),
        })
    }
}

pub async fn add_member<S, P>(
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
    execute(store, publisher, actor, &AddMember(content)).await
}

pub async fn update_member<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    user_id: &str,
    group_id: &str,
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
        &UpdateMember {
            user_id,
            group_id,
            opts,
        },
    )
    .await
}

pub async fn remove_member<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    user_id: &str,
    group_id: &str,
) -> Result<Report>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
{
    execute(store, publisher, actor, &RemoveMember { user_id, group_id })
        .await
}
