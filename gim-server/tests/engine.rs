use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::json;

use gim_server::services::{
    access::{
        authorize, Decision, DenyCause, JsonSchemaValidator, Requester, Target,
    },
    concurrency, hierarchy, membership,
    notify::{Event, MEMBERSHIP_ADDED, MEMBERSHIP_REMOVED},
    resolver::{group_members, user_groups, ResolveOpts},
};
use gim_slo::errors;
use gim_storage::{
    group::Group,
    hierarchy::{Content as Link, HierarchyEdge},
    membership::{Content as Join, Membership},
    resource::{Definition, Scope},
    user::{User, UserStatus},
    MemoryStore, ResourceStore,
};
use gim_watch::{WatchGuard, WatcherHub};

type Seen = Arc<Mutex<Vec<(String, Event)>>>;

const ROOT: &str = "100";
const LEAF: &str = "200";

async fn store_with(groups: &[&str]) -> MemoryStore {
    let store = MemoryStore::new();
    for id in groups {
        store
            .insert_group(Group {
                id: (*id).to_owned(),
                slug: format!("group-{}", id),
                name: (*id).to_owned(),
                ..Default::default()
            })
            .await;
    }
    store
}

async fn user(store: &MemoryStore, id: &str, status: UserStatus) {
    store
        .insert_user(User {
            id: id.to_owned(),
            status,
        })
        .await;
}

fn record(
    hub: &WatcherHub<Event>,
    prefix: &str,
) -> (Seen, Box<dyn WatchGuard + Send>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let guard = hub.watch(prefix, 0, move |subject: &str, event: Event| {
        sink.lock().unwrap().push((subject.to_owned(), event));
    });
    (seen, guard)
}

fn link(parent: &str, member: &str) -> Link {
    Link {
        parent_id: parent.to_owned(),
        member_id: member.to_owned(),
        expires_at: None,
    }
}

fn join(user_id: &str, group_id: &str) -> Join {
    Join {
        user_id: user_id.to_owned(),
        group_id: group_id.to_owned(),
        is_admin: false,
        expires_at: None,
    }
}

#[tokio::test]
async fn nested_membership_flows_to_parent() {
    let store = store_with(&[ROOT, LEAF]).await;
    let hub = WatcherHub::default();
    user(&store, "1", UserStatus::Active).await;
    let (seen, _guard) = record(&hub, "membership.");

    membership::add_member(&store, &hub, "ops", &join("1", LEAF))
        .await
        .unwrap();
    hierarchy::link(&store, &hub, "ops", &link(ROOT, LEAF))
        .await
        .unwrap();

    let groups = user_groups(&store, "1", &ResolveOpts::default())
        .await
        .unwrap();
    assert_eq!(
        groups.into_iter().collect::<Vec<_>>(),
        vec![ROOT.to_owned(), LEAF.to_owned()]
    );
    let members = group_members(&store, ROOT, &ResolveOpts::default())
        .await
        .unwrap();
    assert!(members.contains("1"));

    let subjects: Vec<String> =
        seen.lock().unwrap().iter().map(|(s, _)| s.clone()).collect();
    assert_eq!(subjects, vec![MEMBERSHIP_ADDED, MEMBERSHIP_ADDED]);
}

#[tokio::test]
async fn unlinking_removes_only_inherited_memberships() {
    let store = store_with(&[ROOT, LEAF]).await;
    for n in 0..50 {
        let id = format!("u{}", n);
        user(&store, &id, UserStatus::Active).await;
        store
            .insert_membership(Membership {
                user_id: id,
                group_id: LEAF.to_owned(),
                ..Default::default()
            })
            .await;
    }
    store
        .insert_edge(HierarchyEdge {
            parent_id: ROOT.to_owned(),
            member_id: LEAF.to_owned(),
            expires_at: None,
        })
        .await;
    let hub = WatcherHub::new(200);
    let (seen, _guard) = record(&hub, MEMBERSHIP_REMOVED);

    let report = hierarchy::unlink(&store, &hub, "ops", ROOT, LEAF)
        .await
        .unwrap();
    assert_eq!(report.changes.removed.len(), 50);
    assert!(report.changes.added.is_empty());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 50);
    assert!(seen.iter().all(|(_, event)| matches!(
        event,
        Event::Membership { group_id, .. } if group_id == ROOT
    )));

    let members = group_members(&store, LEAF, &ResolveOpts::default())
        .await
        .unwrap();
    assert_eq!(members.len(), 50);
}

#[tokio::test]
async fn expired_rows_are_ignored_unless_requested() {
    let store = store_with(&[ROOT, LEAF]).await;
    let yesterday = Utc::now().naive_utc() - Duration::days(1);
    store
        .insert_membership(Membership {
            user_id: "1".to_owned(),
            group_id: LEAF.to_owned(),
            ..Default::default()
        })
        .await;
    store
        .insert_edge(HierarchyEdge {
            parent_id: ROOT.to_owned(),
            member_id: LEAF.to_owned(),
            expires_at: Some(yesterday),
        })
        .await;

    let live = user_groups(&store, "1", &ResolveOpts::default())
        .await
        .unwrap();
    assert_eq!(live.into_iter().collect::<Vec<_>>(), vec![LEAF.to_owned()]);

    let mut opts = ResolveOpts::default();
    opts.include_expired = true;
    let all = user_groups(&store, "1", &opts).await.unwrap();
    assert!(all.contains(ROOT));

    let before_expiry = ResolveOpts::at(yesterday - Duration::hours(1));
    let then = user_groups(&store, "1", &before_expiry).await.unwrap();
    assert!(then.contains(ROOT));
}

#[tokio::test]
async fn inactive_users_change_silently() {
    let store = store_with(&[ROOT, LEAF]).await;
    user(&store, "1", UserStatus::Active).await;
    user(&store, "2", UserStatus::Inactive).await;
    for id in ["1", "2"] {
        store
            .insert_membership(Membership {
                user_id: id.to_owned(),
                group_id: LEAF.to_owned(),
                ..Default::default()
            })
            .await;
    }
    let hub = WatcherHub::default();
    let (seen, _guard) = record(&hub, MEMBERSHIP_ADDED);

    let report = hierarchy::link(&store, &hub, "ops", &link(ROOT, LEAF))
        .await
        .unwrap();
    assert_eq!(report.changes.added.len(), 2);
    assert_eq!(report.published, 1);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].1,
        Event::Membership {
            user_id: "1".to_owned(),
            group_id: ROOT.to_owned(),
        }
    );
}

#[tokio::test]
async fn rejected_cycle_leaves_no_trace() {
    let store = store_with(&[ROOT, LEAF]).await;
    let hub = WatcherHub::default();
    hierarchy::link(&store, &hub, "ops", &link(ROOT, LEAF))
        .await
        .unwrap();
    let audited = store.audit_log().await.len();
    let last = hub.last_modify();

    let err = hierarchy::link(&store, &hub, "ops", &link(LEAF, ROOT))
        .await
        .unwrap_err();
    assert_eq!(err, errors::conflict("x"));
    assert_eq!(store.audit_log().await.len(), audited);
    assert_eq!(hub.last_modify(), last);
    assert!(!hierarchy::check_cycle(&store, ROOT, "300").await.unwrap());
}

#[tokio::test]
async fn access_follows_effective_membership() {
    let store = store_with(&[ROOT, LEAF, "300"]).await;
    user(&store, "1", UserStatus::Active).await;
    user(&store, "2", UserStatus::Active).await;
    let hub = WatcherHub::default();
    membership::add_member(&store, &hub, "ops", &join("1", LEAF))
        .await
        .unwrap();
    membership::add_member(&store, &hub, "ops", &join("2", "300"))
        .await
        .unwrap();
    hierarchy::link(&store, &hub, "ops", &link(ROOT, LEAF))
        .await
        .unwrap();
    store
        .insert_definition(Definition {
            id: "9".to_owned(),
            name: "dashboard".to_owned(),
            schema: json!({"type": "object", "required": ["title"]}),
            scope: Scope::System,
            admin_group: Some("300".to_owned()),
        })
        .await;

    let opts = ResolveOpts::default();
    let member = Requester::resolve(&store, "1", false, &opts).await.unwrap();
    let group_admin =
        Requester::resolve(&store, "2", false, &opts).await.unwrap();
    let stranger = Requester::resolve(&store, "3", false, &opts).await.unwrap();

    let owner = json!({"kind": "group", "id": ROOT});
    let created = concurrency::create_resource(
        &store,
        &JsonSchemaValidator,
        &member,
        "9",
        &json!({"title": "q3"}),
        Some(&owner),
    )
    .await
    .unwrap();

    let definition = store.get_definition("9").await.unwrap();
    let stored = store.get_resource(&created.id).await.unwrap();
    let target = Target::Existing(stored.as_ref());
    let validator = JsonSchemaValidator;
    assert!(authorize(&validator, &member, &definition, target).is_allowed());
    assert!(
        authorize(&validator, &group_admin, &definition, target).is_allowed()
    );
    assert_eq!(
        authorize(&validator, &stranger, &definition, target),
        Decision::Deny(DenyCause::Forbidden)
    );

    let patch_a = json!({"title": "a"});
    let patch_b = json!({"title": "b"});
    let (a, b) = tokio::join!(
        concurrency::conditional_update(
            &store,
            &validator,
            &created.id,
            created.resource_version,
            &patch_a,
        ),
        concurrency::conditional_update(
            &store,
            &validator,
            &created.id,
            created.resource_version,
            &patch_b,
        ),
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let err = concurrency::conditional_update(
        &store,
        &validator,
        &created.id,
        created.resource_version,
        &json!({}),
    )
    .await
    .unwrap_err();
    assert_eq!(err, errors::bad_request("x"));
}
