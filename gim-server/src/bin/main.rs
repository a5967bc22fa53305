use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gim_server::{
    load,
    services::{
        access::{authorize, Decision, DenyCause, Requester, Target},
        concurrency, groups, hierarchy, membership,
        notify::Event,
        requests,
        resolver::{self, ResolveOpts},
        Report,
    },
    version, App, AppConfig,
};
use gim_storage::{connection_manager, group, ResourceStore};

#[derive(Parser, Debug)]
#[command(name = "gimctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Groups a user effectively belongs to.
    ResolveUser {
        user_id: String,
        #[arg(long)]
        include_expired: bool,
        #[arg(long)]
        at: Option<NaiveDateTime>,
    },
    /// Users effectively belonging to a group.
    ResolveGroup {
        group_id: String,
        #[arg(long)]
        include_expired: bool,
        #[arg(long)]
        at: Option<NaiveDateTime>,
    },
    CreateGroup {
        #[arg(long)]
        slug: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = String::new())]
        description: String,
    },
    DeleteGroup {
        group_id: String,
    },
    AddMember {
        user_id: String,
        group_id: String,
        #[arg(long)]
        admin: bool,
        #[arg(long)]
        expires_at: Option<NaiveDateTime>,
    },
    UpdateMember {
        user_id: String,
        group_id: String,
        #[arg(long)]
        admin: Option<bool>,
        #[arg(long)]
        expires_at: Option<NaiveDateTime>,
        #[arg(long)]
        clear_expiry: bool,
    },
    RemoveMember {
        user_id: String,
        group_id: String,
    },
    /// Nests `member_id` inside `parent_id`.
    Link {
        parent_id: String,
        member_id: String,
        #[arg(long)]
        expires_at: Option<NaiveDateTime>,
    },
    UpdateLink {
        parent_id: String,
        member_id: String,
        #[arg(long)]
        expires_at: Option<NaiveDateTime>,
        #[arg(long)]
        clear_expiry: bool,
    },
    Unlink {
        parent_id: String,
        member_id: String,
    },
    WouldCycle {
        parent_id: String,
        member_id: String,
    },
    Approve {
        request_id: String,
    },
    Deny {
        request_id: String,
    },
    /// Checks whether a user may act on a stored resource.
    Authorize {
        user_id: String,
        resource_id: String,
        #[arg(long)]
        system_admin: bool,
    },
    CreateResource {
        user_id: String,
        definition_id: String,
        /// JSON payload.
        #[arg(long)]
        payload: String,
        /// JSON owner reference, e.g. {"kind":"group","id":"42"}.
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        system_admin: bool,
    },
    UpdateResource {
        resource_id: String,
        #[arg(long)]
        expected: u64,
        #[arg(long)]
        payload: String,
    },
    DeleteResource {
        resource_id: String,
        #[arg(long)]
        expected: u64,
    },
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config.config {
        Some(path) => load(path)?,
        None => cli.config.clone(),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!("{:#?}", &config);
    info!("{}", version());
    if let Command::Version = cli.command {
        println!("{}", version());
        return Ok(());
    }
    run(config, cli.command).await
}

async fn run(config: AppConfig, command: Command) -> Result<()> {
    info!("configuration parsed, initializing Mariadb connection...");
    let pool = connection_manager(
        config.database_url()?,
        config.max_size,
        config.min_idle,
        config.run_migrations,
    )
    .await
    .context("could not initialize the database connection pool")?;

    let app = App::new(pool, config)?;
    let _guard = app.hub.watch("", 0, |subject: &str, event: Event| {
        info!(subject, ?event, "event published");
    });

    let output = dispatch(&app, command).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output)
            .context("could not render output")?
    );
    Ok(())
}

fn opts(include_expired: bool, at: Option<NaiveDateTime>) -> ResolveOpts {
    let mut opts = at.map(ResolveOpts::at).unwrap_or_default();
    opts.include_expired = include_expired;
    opts
}

fn parse_json(raw: &str, what: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .with_context(|| format!("{} is not valid JSON", what))
}

fn report(report: &Report) -> Value {
    let pairs = |items: &[gim_graph::Effective<String, String>]| -> Vec<Value> {
        items
            .iter()
            .map(|item| json!({"user_id": item.user, "group_id": item.group}))
            .collect()
    };
    json!({
        "audit_id": report.audit_id,
        "added": pairs(&report.changes.added),
        "removed": pairs(&report.changes.removed),
        "published": report.published,
    })
}

async fn dispatch(app: &App, command: Command) -> Result<Value> {
    let store = &app.store;
    let hub = &app.hub;
    let actor = app.config.actor.as_str();
    let out = match command {
        Command::ResolveUser {
            user_id,
            include_expired,
            at,
        } => json!(
            resolver::user_groups(store, &user_id, &opts(include_expired, at))
                .await?
        ),
        Command::ResolveGroup {
            group_id,
            include_expired,
            at,
        } => json!(
            resolver::group_members(store, &group_id, &opts(include_expired, at))
                .await?
        ),
        Command::CreateGroup {
            slug,
            name,
            description,
        } => {
            let content = group::Content {
                slug,
                name,
                description,
            };
            let (group, _) =
                groups::create_group(store, hub, actor, &content).await?;
            serde_json::to_value(group)?
        }
        Command::DeleteGroup { group_id } => {
            report(&groups::delete_group(store, hub, actor, &group_id).await?)
        }
        Command::AddMember {
            user_id,
            group_id,
            admin,
            expires_at,
        } => {
            let content = gim_storage::membership::Content {
                user_id,
                group_id,
                is_admin: admin,
                expires_at,
            };
            report(&membership::add_member(store, hub, actor, &content).await?)
        }
        Command::UpdateMember {
            user_id,
            group_id,
            admin,
            expires_at,
            clear_expiry,
        } => {
            let update = gim_storage::membership::UpdateOpts {
                is_admin: admin,
                expires_at,
                clear_expiry,
            };
            report(
                &membership::update_member(
                    store, hub, actor, &user_id, &group_id, &update,
                )
                .await?,
            )
        }
        Command::RemoveMember { user_id, group_id } => report(
            &membership::remove_member(store, hub, actor, &user_id, &group_id)
                .await?,
        ),
        Command::Link {
            parent_id,
            member_id,
            expires_at,
        } => {
            let content = gim_storage::hierarchy::Content {
                parent_id,
                member_id,
                expires_at,
            };
            report(&hierarchy::link(store, hub, actor, &content).await?)
        }
        Command::UpdateLink {
            parent_id,
            member_id,
            expires_at,
            clear_expiry,
        } => {
            let update = gim_storage::hierarchy::UpdateOpts {
                expires_at,
                clear_expiry,
            };
            report(
                &hierarchy::update_link(
                    store, hub, actor, &parent_id, &member_id, &update,
                )
                .await?,
            )
        }
        Command::Unlink {
            parent_id,
            member_id,
        } => report(
            &hierarchy::unlink(store, hub, actor, &parent_id, &member_id)
                .await?,
        ),
        Command::WouldCycle {
            parent_id,
            member_id,
        } => json!(hierarchy::check_cycle(store, &parent_id, &member_id).await?),
        Command::Approve { request_id } => {
            report(&requests::approve(store, hub, actor, &request_id).await?)
        }
        Command::Deny { request_id } => {
            report(&requests::deny(store, hub, actor, &request_id).await?)
        }
        Command::Authorize {
            user_id,
            resource_id,
            system_admin,
        } => {
            let requester = Requester::resolve(
                store,
                &user_id,
                system_admin,
                &ResolveOpts::default(),
            )
            .await?;
            let resource = store.get_resource(&resource_id).await?;
            let decision = match &resource {
                Some(found) => {
                    let definition =
                        store.get_definition(&found.definition_id).await?;
                    authorize(
                        &app.validator,
                        &requester,
                        &definition,
                        Target::Existing(Some(found)),
                    )
                }
                None => Decision::Deny(DenyCause::NotFound),
            };
            json!({
                "allowed": decision.is_allowed(),
                "decision": format!("{:?}", decision),
            })
        }
        Command::CreateResource {
            user_id,
            definition_id,
            payload,
            owner,
            system_admin,
        } => {
            let payload = parse_json(&payload, "payload")?;
            let owner = owner
                .as_deref()
                .map(|raw| parse_json(raw, "owner"))
                .transpose()?;
            let requester = Requester::resolve(
                store,
                &user_id,
                system_admin,
                &ResolveOpts::default(),
            )
            .await?;
            let resource = concurrency::create_resource(
                store,
                &app.validator,
                &requester,
                &definition_id,
                &payload,
                owner.as_ref(),
            )
            .await?;
            serde_json::to_value(resource)?
        }
        Command::UpdateResource {
            resource_id,
            expected,
            payload,
        } => {
            let payload = parse_json(&payload, "payload")?;
            let updated = concurrency::conditional_update(
                store,
                &app.validator,
                &resource_id,
                expected,
                &payload,
            )
            .await?;
            json!({
                "resource_version": updated.resource_version,
                "updated_at": updated.updated_at,
            })
        }
        Command::DeleteResource {
            resource_id,
            expected,
        } => {
            concurrency::conditional_delete(store, &resource_id, expected)
                .await?;
            json!({"deleted": resource_id})
        }
        Command::Version => json!(version()),
    };
    Ok(out)
}
