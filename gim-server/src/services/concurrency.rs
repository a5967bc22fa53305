use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use gim_slo::{errors, next_id, Result};
use gim_storage::{
    resource::{Resource, Updated},
    ResourceStore,
};

use super::access::{
    authorize, parse_owner, Requester, SchemaValidator, Target,
};

/// Next stamp after `expected`: the current millisecond unless that would
/// not advance the version.
pub fn next_version(now_ms: i64, expected: u64) -> u64 {
    let now = u64::try_from(now_ms).unwrap_or_default();
    now.max(expected.saturating_add(1))
}

/// Writes `payload` only while the stored version is still `expected`.
///
/// A missing resource is `NotFound`, a payload failing the definition
/// schema is `BadRequest`, and a version that moved on is
/// `VersionConflict`. Conflicts are never retried here.
#[tracing::instrument(skip(store, validator, payload))]
pub async fn conditional_update<R, V>(
    store: &R,
    validator: &V,
    resource_id: &str,
    expected: u64,
    payload: &Value,
) -> Result<Updated>
where
    R: ResourceStore + ?Sized,
    V: SchemaValidator + ?Sized,
{
    let resource = store
        .get_resource(resource_id)
        .await?
        .ok_or_else(|| errors::not_found(&format!("resource {}", resource_id)))?;
    let definition = store.get_definition(&resource.definition_id).await?;
    validator
        .validate(&definition.schema, payload)
        .map_err(|msg| errors::bad_request(&msg))?;

    let now = Utc::now();
    let version = next_version(now.timestamp_millis(), expected);
    let updated_at = now.naive_utc();
    let rows = store
        .conditional_update(resource_id, expected, payload, version, updated_at)
        .await?;
    if rows == 0 {
        warn!(expected, "stale resource version");
        return Err(errors::version_conflict(&format!(
            "resource {} is no longer at version {}",
            resource_id, expected
        )));
    }
    info!(version, "resource updated");
    Ok(Updated {
        resource_version: version,
        updated_at,
    })
}

/// Soft-deletes the resource under the same version guard as updates.
#[tracing::instrument(skip(store))]
pub async fn conditional_delete<R>(
    store: &R,
    resource_id: &str,
    expected: u64,
) -> Result<()>
where
    R: ResourceStore + ?Sized,
{
    if store.get_resource(resource_id).await?.is_none() {
        return Err(errors::not_found(&format!("resource {}", resource_id)));
    }
    let rows = store
        .conditional_delete(resource_id, expected, Utc::now().naive_utc())
        .await?;
    if rows == 0 {
        return Err(errors::version_conflict(&format!(
            "resource {} is no longer at version {}",
            resource_id, expected
        )));
    }
    Ok(())
}

/// Authorizes and stores a new resource of `definition_id`.
#[tracing::instrument(skip(store, validator, requester, payload, owner))]
pub async fn create_resource<R, V>(
    store: &R,
    validator: &V,
    requester: &Requester,
    definition_id: &str,
    payload: &Value,
    owner: Option<&Value>,
) -> Result<Resource>
where
    R: ResourceStore + ?Sized,
    V: SchemaValidator + ?Sized,
{
    let definition = store.get_definition(definition_id).await?;
    authorize(
        validator,
        requester,
        &definition,
        Target::Pending { payload, owner },
    )
    .into_result()?;
    let owner = parse_owner(&definition, owner)?;
    let now = Utc::now();
    let resource = Resource {
        id: next_id()?.to_string(),
        definition_id: definition.id,
        payload: payload.clone(),
        owner,
        resource_version: next_version(now.timestamp_millis(), 0),
        created_at: now.naive_utc(),
        updated_at: now.naive_utc(),
        deleted_at: None,
    };
    store.create_resource(&resource).await?;
    Ok(resource)
}
