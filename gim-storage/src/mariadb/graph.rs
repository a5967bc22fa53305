use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{mysql::MySqlRow, types::Json, MySql, Row, Transaction};

use gim_slo::{errors, next_id, Result};

use super::{db_error, id_list, parse_id, MariadbStore};
use crate::{
    audit::AuditEntry,
    group::Group,
    hierarchy::HierarchyEdge,
    membership::Membership,
    request::{Request, Subject},
    user::{User, UserStatus},
    GraphStore, GraphTx, Snapshot,
};

#[async_trait]
impl GraphStore for MariadbStore {
    type Tx = MariadbTx;

    #[tracing::instrument(skip(self))]
    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await.map_err(errors::any)?;
        Ok(MariadbTx { tx })
    }
}

pub struct MariadbTx {
    tx: Transaction<'static, MySql>,
}

impl fmt::Debug for MariadbTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MariadbTx").finish_non_exhaustive()
    }
}

fn group_from_row(row: &MySqlRow) -> Result<Group> {
    Ok(Group {
        id: row
            .try_get::<u64, _>("id")
            .map_err(errors::any)?
            .to_string(),
        slug: row.try_get("slug").map_err(errors::any)?,
        name: row.try_get("name").map_err(errors::any)?,
        description: row.try_get("description").map_err(errors::any)?,
        created_at: row.try_get("created_at").map_err(errors::any)?,
        updated_at: row.try_get("updated_at").map_err(errors::any)?,
        deleted_at: row.try_get("deleted_at").map_err(errors::any)?,
    })
}

fn membership_from_row(row: &MySqlRow) -> Result<Membership> {
    Ok(Membership {
        user_id: row
            .try_get::<u64, _>("user_id")
            .map_err(errors::any)?
            .to_string(),
        group_id: row
            .try_get::<u64, _>("group_id")
            .map_err(errors::any)?
            .to_string(),
        is_admin: row.try_get("is_admin").map_err(errors::any)?,
        expires_at: row.try_get("expires_at").map_err(errors::any)?,
    })
}

fn edge_from_row(row: &MySqlRow) -> Result<HierarchyEdge> {
    Ok(HierarchyEdge {
        parent_id: row
            .try_get::<u64, _>("parent_id")
            .map_err(errors::any)?
            .to_string(),
        member_id: row
            .try_get::<u64, _>("member_id")
            .map_err(errors::any)?
            .to_string(),
        expires_at: row.try_get("expires_at").map_err(errors::any)?,
    })
}

impl MariadbTx {
    async fn hold_sentinel(&mut self, sql: &str) -> Result<()> {
        match sqlx::query(sql).fetch_optional(&mut *self.tx).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(errors::any(sqlx::Error::RowNotFound)),
            Err(err) => Err(errors::any(err)),
        }
    }
}

#[async_trait]
impl GraphTx for MariadbTx {
    #[tracing::instrument(skip(self))]
    async fn lock_hierarchy(&mut self) -> Result<()> {
        self.hold_sentinel(
            r#"SELECT `id` FROM `hierarchy_lock` WHERE `id` = 1 FOR UPDATE;"#,
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn share_hierarchy(&mut self) -> Result<()> {
        self.hold_sentinel(
            r#"SELECT `id` FROM `hierarchy_lock` WHERE `id` = 1 LOCK IN SHARE MODE;"#,
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn lock_groups(&mut self, ids: &[String]) -> Result<Vec<Group>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            format!(
                r#"SELECT `id`,`slug`,`name`,`description`,`created_at`,`updated_at`,`deleted_at`
                FROM `group`
                WHERE `id` IN ({}) AND `deleted` = 0
                ORDER BY `id` FOR UPDATE;"#,
                id_list(ids)?,
            )
            .as_str(),
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        rows.iter().map(group_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn snapshot(&mut self) -> Result<Snapshot> {
        let rows = sqlx::query(
            r#"SELECT `user_id`,`group_id`,`is_admin`,`expires_at`
            FROM `group_membership`;"#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        let memberships = rows
            .iter()
            .map(membership_from_row)
            .collect::<Result<Vec<_>>>()?;

        let rows = sqlx::query(
            r#"SELECT `parent_id`,`member_id`,`expires_at`
            FROM `group_hierarchy`;"#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        let edges = rows
            .iter()
            .map(edge_from_row)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            memberships = memberships.len(),
            edges = edges.len(),
            "snapshot loaded"
        );
        Ok(Snapshot { memberships, edges })
    }

    #[tracing::instrument(skip(self, ids))]
    async fn users(&mut self, ids: &[String]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            format!(
                r#"SELECT `id`,`status` FROM `user` WHERE `id` IN ({});"#,
                id_list(ids)?,
            )
            .as_str(),
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        let mut users = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(User {
                id: row
                    .try_get::<u64, _>("id")
                    .map_err(errors::any)?
                    .to_string(),
                status: UserStatus::parse(
                    row.try_get::<&str, _>("status").map_err(errors::any)?,
                ),
            });
        }
        Ok(users)
    }

    #[tracing::instrument(skip(self))]
    async fn put_group(&mut self, group: &Group) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO `group`
            (`id`,`slug`,`name`,`description`,`created_at`,`updated_at`)
            VALUES(?,?,?,?,?,?);"#,
        )
        .bind(parse_id(&group.id)?)
        .bind(&group.slug)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_group(
        &mut self,
        id: &str,
        at: NaiveDateTime,
    ) -> Result<()> {
        let id = parse_id(id)?;
        let result = sqlx::query(
            r#"UPDATE `group` SET `deleted` = `id`,`deleted_at` = ?,`updated_at` = ?
            WHERE `id` = ? AND `deleted` = 0;"#,
        )
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        if result.rows_affected() == 0 {
            return Err(errors::not_found(&format!("group {}", id)));
        }
        sqlx::query(r#"DELETE FROM `group_membership` WHERE `group_id` = ?;"#)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(errors::any)?;
        sqlx::query(
            r#"DELETE FROM `group_hierarchy`
            WHERE `parent_id` = ? OR `member_id` = ?;"#,
        )
        .bind(id)
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        sqlx::query(
            r#"DELETE FROM `membership_request`
            WHERE `group_id` = ? OR (`subject_kind` = 'group' AND `subject_id` = ?);"#,
        )
        .bind(id)
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_membership(
        &mut self,
        user_id: &str,
        group_id: &str,
    ) -> Result<Option<Membership>> {
        let row = sqlx::query(
            r#"SELECT `user_id`,`group_id`,`is_admin`,`expires_at`
            FROM `group_membership`
            WHERE `user_id` = ? AND `group_id` = ?;"#,
        )
        .bind(parse_id(user_id)?)
        .bind(parse_id(group_id)?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        row.as_ref().map(membership_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn put_membership(&mut self, membership: &Membership) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO `group_membership`
            (`user_id`,`group_id`,`is_admin`,`expires_at`)
            VALUES(?,?,?,?)
            ON DUPLICATE KEY UPDATE `is_admin` = VALUES(`is_admin`),`expires_at` = VALUES(`expires_at`);"#,
        )
        .bind(parse_id(&membership.user_id)?)
        .bind(parse_id(&membership.group_id)?)
        .bind(membership.is_admin)
        .bind(membership.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_membership(
        &mut self,
        user_id: &str,
        group_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"DELETE FROM `group_membership`
            WHERE `user_id` = ? AND `group_id` = ?;"#,
        )
        .bind(parse_id(user_id)?)
        .bind(parse_id(group_id)?)
        .execute(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn get_edge(
        &mut self,
        parent_id: &str,
        member_id: &str,
    ) -> Result<Option<HierarchyEdge>> {
        let row = sqlx::query(
            r#"SELECT `parent_id`,`member_id`,`expires_at`
            FROM `group_hierarchy`
            WHERE `parent_id` = ? AND `member_id` = ?;"#,
        )
        .bind(parse_id(parent_id)?)
        .bind(parse_id(member_id)?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        row.as_ref().map(edge_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn put_edge(&mut self, edge: &HierarchyEdge) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO `group_hierarchy`
            (`parent_id`,`member_id`,`expires_at`)
            VALUES(?,?,?)
            ON DUPLICATE KEY UPDATE `expires_at` = VALUES(`expires_at`);"#,
        )
        .bind(parse_id(&edge.parent_id)?)
        .bind(parse_id(&edge.member_id)?)
        .bind(edge.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_edge(
        &mut self,
        parent_id: &str,
        member_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"DELETE FROM `group_hierarchy`
            WHERE `parent_id` = ? AND `member_id` = ?;"#,
        )
        .bind(parse_id(parent_id)?)
        .bind(parse_id(member_id)?)
        .execute(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn lock_request(&mut self, id: &str) -> Result<Option<Request>> {
        let row = match sqlx::query(
            r#"SELECT `id`,`group_id`,`subject_kind`,`subject_id`,`is_admin`,`expires_at`,`created_at`
            FROM `membership_request`
            WHERE `id` = ? FOR UPDATE;"#,
        )
        .bind(parse_id(id)?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(errors::any)?
        {
            Some(row) => row,
            None => return Ok(None),
        };
        let subject_id = row
            .try_get::<u64, _>("subject_id")
            .map_err(errors::any)?
            .to_string();
        let subject =
            match row.try_get::<&str, _>("subject_kind").map_err(errors::any)? {
                "user" => Subject::User(subject_id),
                "group" => Subject::Group(subject_id),
                v => {
                    return Err(errors::anyhow(anyhow::anyhow!(
                        "request {} has unknown subject kind {}",
                        id,
                        v
                    )))
                }
            };
        Ok(Some(Request {
            id: row
                .try_get::<u64, _>("id")
                .map_err(errors::any)?
                .to_string(),
            group_id: row
                .try_get::<u64, _>("group_id")
                .map_err(errors::any)?
                .to_string(),
            subject,
            is_admin: row.try_get("is_admin").map_err(errors::any)?,
            expires_at: row.try_get("expires_at").map_err(errors::any)?,
            created_at: row.try_get("created_at").map_err(errors::any)?,
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn delete_request(&mut self, id: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM `membership_request` WHERE `id` = ?;"#)
            .bind(parse_id(id)?)
            .execute(&mut *self.tx)
            .await
            .map_err(errors::any)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, entry), fields(action = %entry.action))]
    async fn record_audit(&mut self, entry: &AuditEntry) -> Result<String> {
        let id = next_id()?;
        sqlx::query(
            r#"INSERT INTO `audit_log`
            (`id`,`actor`,`action`,`before`,`after`)
            VALUES(?,?,?,?,?);"#,
        )
        .bind(id)
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(Json(&entry.before))
        .bind(Json(&entry.after))
        .execute(&mut *self.tx)
        .await
        .map_err(errors::any)?;
        Ok(id.to_string())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(errors::any)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(errors::any)
    }
}
