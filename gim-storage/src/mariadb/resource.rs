use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use sqlx::{types::Json, Row};

use gim_slo::{errors, Result};

use super::{db_error, parse_id, MariadbStore};
use crate::{
    resource::{Definition, Owner, Resource, Scope},
    ResourceStore,
};

#[async_trait]
impl ResourceStore for MariadbStore {
    #[tracing::instrument(skip(self))]
    async fn get_definition(&self, id: &str) -> Result<Definition> {
        let row = match sqlx::query(
            r#"SELECT `id`,`name`,`schema`,`scope`,`admin_group`
            FROM `extension_definition`
            WHERE `id` = ? AND `deleted` = 0;"#,
        )
        .bind(parse_id(id)?)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(v) => match v {
                Some(value) => Ok(value),
                None => Err(errors::not_found("no rows")),
            },
            Err(err) => Err(errors::any(err)),
        }?;
        Ok(Definition {
            id: row
                .try_get::<u64, _>("id")
                .map_err(errors::any)?
                .to_string(),
            name: row.try_get("name").map_err(errors::any)?,
            schema: row
                .try_get::<Json<Value>, _>("schema")
                .map_err(errors::any)?
                .0,
            scope: Scope::parse(
                row.try_get::<&str, _>("scope").map_err(errors::any)?,
            )?,
            admin_group: row
                .try_get::<Option<u64>, _>("admin_group")
                .map_err(errors::any)?
                .map(|v| v.to_string()),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        let row = match sqlx::query(
            r#"SELECT `id`,`definition_id`,`payload`,`owner_kind`,`owner_id`,
            `resource_version`,`created_at`,`updated_at`,`deleted_at`
            FROM `extension_resource`
            WHERE `id` = ? AND `deleted` = 0;"#,
        )
        .bind(parse_id(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(errors::any)?
        {
            Some(row) => row,
            None => return Ok(None),
        };
        let owner = match (
            row.try_get::<Option<&str>, _>("owner_kind")
                .map_err(errors::any)?,
            row.try_get::<Option<u64>, _>("owner_id")
                .map_err(errors::any)?,
        ) {
            (Some(kind), Some(owner_id)) => {
                Some(Owner::from_parts(kind, owner_id.to_string())?)
            }
            _ => None,
        };
        Ok(Some(Resource {
            id: row
                .try_get::<u64, _>("id")
                .map_err(errors::any)?
                .to_string(),
            definition_id: row
                .try_get::<u64, _>("definition_id")
                .map_err(errors::any)?
                .to_string(),
            payload: row
                .try_get::<Json<Value>, _>("payload")
                .map_err(errors::any)?
                .0,
            owner,
            resource_version: row
                .try_get("resource_version")
                .map_err(errors::any)?,
            created_at: row.try_get("created_at").map_err(errors::any)?,
            updated_at: row.try_get("updated_at").map_err(errors::any)?,
            deleted_at: row.try_get("deleted_at").map_err(errors::any)?,
        }))
    }

    #[tracing::instrument(skip(self, resource), fields(id = %resource.id))]
    async fn create_resource(&self, resource: &Resource) -> Result<()> {
        let owner_id = resource
            .owner
            .as_ref()
            .map(|owner| parse_id(owner.id()))
            .transpose()?;
        sqlx::query(
            r#"INSERT INTO `extension_resource`
            (`id`,`definition_id`,`payload`,`owner_kind`,`owner_id`,`resource_version`,`created_at`,`updated_at`)
            VALUES(?,?,?,?,?,?,?,?);"#,
        )
        .bind(parse_id(&resource.id)?)
        .bind(parse_id(&resource.definition_id)?)
        .bind(Json(&resource.payload))
        .bind(resource.owner.as_ref().map(Owner::kind))
        .bind(owner_id)
        .bind(resource.resource_version)
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, payload))]
    async fn conditional_update(
        &self,
        id: &str,
        expected: u64,
        payload: &Value,
        version: u64,
        updated_at: NaiveDateTime,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE `extension_resource`
            SET `payload` = ?,`resource_version` = ?,`updated_at` = ?
            WHERE `id` = ? AND `resource_version` = ? AND `deleted` = 0;"#,
        )
        .bind(Json(payload))
        .bind(version)
        .bind(updated_at)
        .bind(parse_id(id)?)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn conditional_delete(
        &self,
        id: &str,
        expected: u64,
        at: NaiveDateTime,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE `extension_resource`
            SET `deleted` = `id`,`deleted_at` = ?
            WHERE `id` = ? AND `resource_version` = ? AND `deleted` = 0;"#,
        )
        .bind(at)
        .bind(parse_id(id)?)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;
        Ok(result.rows_affected())
    }
}
