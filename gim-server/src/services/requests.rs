use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;

use gim_slo::{errors, Result};
use gim_storage::{
    hierarchy::HierarchyEdge,
    membership::Membership,
    request::{Request, Subject},
    GraphStore, GraphTx,
};
use gim_watch::Publisher;

use super::{
    hierarchy::insert_edge,
    membership::insert_membership,
    mutation::{execute, lock_existing, Applied, Mutation, Report},
    notify::{Event, REQUEST_APPROVED, REQUEST_DENIED},
};

async fn pending<T: GraphTx>(tx: &mut T, id: &str) -> Result<Request> {
    tx.lock_request(id)
        .await?
        .ok_or_else(|| errors::not_found(&format!("request {}", id)))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(errors::any)
}

struct Approve<'a>(&'a str);

#[async_trait]
impl<'a> Mutation for Approve<'a> {
    fn action(&self) -> &'static str {
        "request.approve"
    }

    // The subject is unknown until the request is read, so the exclusive
    // hierarchy lock comes first.
    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        tx.lock_hierarchy().await?;
        let request = pending(tx, self.0).await?;
        match &request.subject {
            Subject::User(_) => {
                lock_existing(tx, &[request.group_id.as_str()]).await
            }
            Subject::Group(member_id) => {
                lock_existing(
                    tx,
                    &[request.group_id.as_str(), member_id.as_str()],
                )
                .await
            }
        }
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        let request = pending(tx, self.0).await?;
        let after = match &request.subject {
            Subject::User(user_id) => {
                let membership = Membership {
                    user_id: user_id.clone(),
                    group_id: request.group_id.clone(),
                    is_admin: request.is_admin,
                    expires_at: request.expires_at,
                };
                insert_membership(tx, &membership).await?;
                to_value(&membership)?
            }
            Subject::Group(member_id) => {
                let edge = HierarchyEdge {
                    parent_id: request.group_id.clone(),
                    member_id: member_id.clone(),
                    expires_at: request.expires_at,
                };
                insert_edge(tx, &edge).await?;
                to_value(&edge)?
            }
        };
        tx.delete_request(&request.id).await?;
        Ok(Applied {
            before: to_value(&request)?,
            after,
            subject: REQUEST_APPROVED,
            event: Event::Request(request),
        })
    }
}

struct Deny<'a>(&'a str);

#[async_trait]
impl<'a> Mutation for Deny<'a> {
    fn action(&self) -> &'static str {
        "request.deny"
    }

    async fn lock<T: GraphTx>(&self, tx: &mut T) -> Result<()> {
        tx.share_hierarchy().await?;
        let request = pending(tx, self.0).await?;
        lock_existing(tx, &[request.group_id.as_str()]).await
    }

    async fn apply<T: GraphTx>(
        &self,
        tx: &mut T,
        _at: NaiveDateTime,
    ) -> Result<Applied> {
        let request = pending(tx, self.0).await?;
        tx.delete_request(&request.id).await?;
        Ok(Applied {
            before: to_value(&request)?,
            after: Value::Null,
            subject: REQUEST_DENIED,
            event: Event::Request(request),
        })
    }
}

/// Performs the membership or nesting the request asks for, then drops it.
pub async fn approve<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    request_id: &str,
) -> Result<Report>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
{
    execute(store, publisher, actor, &Approve(request_id)).await
}

pub async fn deny<S, P>(
    store: &S,
    publisher: &P,
    actor: &str,
    request_id: &str,
) -> Result<Report>
where
    S: GraphStore,
    P: Publisher<Event> + ?Sized,
{
    execute(store, publisher, actor, &Deny(request_id)).await
}
