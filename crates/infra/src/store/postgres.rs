//! Postgres-backed control panel store.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` (unique violation) | `Conflict` | Caste already taken in the role's scope |
//! | `23503` (foreign key violation) | `NotFound` | Unknown board, role or permission referenced |
//! | any other / pool / network | `Backend` | Everything else |
//!
//! ## Atomicity
//!
//! `replace_grants` runs its detach and attach inside one transaction; the
//! role row is locked first so concurrent commits for one role serialize.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use boardcp_auth::{Capcode, Caste, Permission, PermissionGroup, PermissionId, Principal, Role, RolePermission};
use boardcp_core::{BoardUri, DomainError, RoleId};

use super::{
    Board, BoardStore, GrantStore, PermissionCatalog, RoleStore, StoreError, ensure_grants_belong_to,
};
use crate::seed::SeedStore;

const SCHEMA: &str = include_str!("../../migrations/0001_control_panel.sql");

const ROLE_COLUMNS: &str = "role_id, board_uri, caste, name, capcode, weight";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Apply the schema. Every statement is `IF NOT EXISTS`, so this is safe on
    /// every start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

fn corrupt(operation: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("undecodable row in {operation}: {err}"))
}

fn corrupt_domain(operation: &str) -> impl Fn(DomainError) -> StoreError + '_ {
    move |e| corrupt(operation, e)
}

fn role_from_row(operation: &str, row: &PgRow) -> Result<Role, StoreError> {
    let role_id: Uuid = row.try_get("role_id").map_err(|e| corrupt(operation, e))?;
    let board_uri: Option<String> = row.try_get("board_uri").map_err(|e| corrupt(operation, e))?;
    let caste: String = row.try_get("caste").map_err(|e| corrupt(operation, e))?;
    let name: String = row.try_get("name").map_err(|e| corrupt(operation, e))?;
    let capcode: Option<String> = row.try_get("capcode").map_err(|e| corrupt(operation, e))?;
    let weight: i32 = row.try_get("weight").map_err(|e| corrupt(operation, e))?;

    Ok(Role {
        role_id: RoleId::from_uuid(role_id),
        board_uri: board_uri
            .as_deref()
            .map(BoardUri::parse)
            .transpose()
            .map_err(corrupt_domain(operation))?,
        caste: Caste::parse(&caste).map_err(corrupt_domain(operation))?,
        name,
        capcode: match capcode {
            Some(raw) => Capcode::parse_optional(&raw).map_err(corrupt_domain(operation))?,
            None => None,
        },
        weight,
    })
}

fn permission_from_row(operation: &str, row: &PgRow) -> Result<Permission, StoreError> {
    let permission_id: String = row.try_get("permission_id").map_err(|e| corrupt(operation, e))?;
    let group_id: String = row.try_get("group_id").map_err(|e| corrupt(operation, e))?;
    let permission_id = PermissionId::parse(permission_id).map_err(corrupt_domain(operation))?;
    Ok(Permission::new(permission_id, group_id))
}

fn uuids(role_ids: &[RoleId]) -> Vec<Uuid> {
    role_ids.iter().map(|id| *id.as_uuid()).collect()
}

#[async_trait::async_trait]
impl BoardStore for PostgresStore {
    #[instrument(skip(self), fields(board_uri = %board_uri), err)]
    async fn find_board(&self, board_uri: &BoardUri) -> Result<Option<Board>, StoreError> {
        let row = sqlx::query("SELECT board_uri, title FROM boards WHERE board_uri = $1")
            .bind(board_uri.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_board", e))?;

        row.map(|row| {
            let title: String = row.try_get("title").map_err(|e| corrupt("find_board", e))?;
            Ok(Board {
                board_uri: board_uri.clone(),
                title,
            })
        })
        .transpose()
    }
}

#[async_trait::async_trait]
impl RoleStore for PostgresStore {
    #[instrument(skip(self), fields(role_id = %role_id), err)]
    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE role_id = $1"))
            .bind(role_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role", e))?;

        row.map(|row| role_from_row("find_role", &row)).transpose()
    }

    #[instrument(skip(self), fields(count = role_ids.len()), err)]
    async fn roles_by_ids(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE role_id = ANY($1) ORDER BY role_id"
        ))
        .bind(uuids(role_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("roles_by_ids", e))?;

        rows.iter().map(|row| role_from_row("roles_by_ids", row)).collect()
    }

    #[instrument(skip(self, principal), fields(board_uri = %board_uri, user_id = %principal.user_id), err)]
    async fn parent_candidates(
        &self,
        board_uri: &BoardUri,
        principal: &Principal,
    ) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            WITH ceiling AS (
                SELECT MAX(weight) AS weight
                FROM roles
                WHERE role_id = ANY($2)
                  AND (board_uri IS NULL OR board_uri = $1)
            )
            SELECT {ROLE_COLUMNS}
            FROM roles
            WHERE (board_uri IS NULL OR board_uri = $1)
              AND weight <= (SELECT weight FROM ceiling)
            ORDER BY weight DESC, caste COLLATE "C" ASC
            "#
        ))
        .bind(board_uri.as_str())
        .bind(uuids(&principal.roles))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("parent_candidates", e))?;

        rows.iter()
            .map(|row| role_from_row("parent_candidates", row))
            .collect()
    }

    #[instrument(skip(self), fields(board_uri = %board_uri, caste = %caste), err)]
    async fn caste_exists(&self, board_uri: &BoardUri, caste: &Caste) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM roles WHERE board_uri = $1 AND caste = $2) AS taken")
            .bind(board_uri.as_str())
            .bind(caste.as_str())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("caste_exists", e))?;

        row.try_get("taken").map_err(|e| corrupt("caste_exists", e))
    }

    #[instrument(skip(self, role), fields(role_id = %role.role_id, caste = %role.caste), err)]
    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roles (role_id, board_uri, caste, name, capcode, weight)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.role_id.as_uuid())
        .bind(role.board_uri.as_ref().map(BoardUri::as_str))
        .bind(role.caste.as_str())
        .bind(&role.name)
        .bind(role.capcode.as_ref().map(Capcode::as_str))
        .bind(role.weight)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PermissionCatalog for PostgresStore {
    #[instrument(skip(self), err)]
    async fn permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query("SELECT permission_id, group_id FROM permissions ORDER BY permission_id COLLATE \"C\"")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permissions", e))?;

        rows.iter()
            .map(|row| permission_from_row("permissions", row))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn permission_groups(&self) -> Result<Vec<PermissionGroup>, StoreError> {
        let group_rows = sqlx::query("SELECT group_id, display_order FROM permission_groups")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission_groups", e))?;
        let permissions = self.permissions().await?;

        let mut groups = Vec::with_capacity(group_rows.len());
        for row in group_rows {
            let group_id: String = row
                .try_get("group_id")
                .map_err(|e| corrupt("permission_groups", e))?;
            let display_order: i32 = row
                .try_get("display_order")
                .map_err(|e| corrupt("permission_groups", e))?;
            let members = permissions
                .iter()
                .filter(|p| p.group_id == group_id)
                .cloned()
                .collect();
            groups.push(PermissionGroup {
                group_id,
                display_order,
                permissions: members,
            });
        }
        PermissionGroup::sort_for_display(&mut groups);
        Ok(groups)
    }
}

#[async_trait::async_trait]
impl GrantStore for PostgresStore {
    #[instrument(skip(self), fields(count = role_ids.len()), err)]
    async fn grants_for_roles(&self, role_ids: &[RoleId]) -> Result<Vec<RolePermission>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT role_id, permission_id, value
            FROM role_permissions
            WHERE role_id = ANY($1)
            ORDER BY role_id, permission_id COLLATE "C"
            "#,
        )
        .bind(uuids(role_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grants_for_roles", e))?;

        let mut grants = Vec::with_capacity(rows.len());
        for row in rows {
            let role_id: Uuid = row.try_get("role_id").map_err(|e| corrupt("grants_for_roles", e))?;
            let permission_id: String = row
                .try_get("permission_id")
                .map_err(|e| corrupt("grants_for_roles", e))?;
            let value: bool = row.try_get("value").map_err(|e| corrupt("grants_for_roles", e))?;
            grants.push(RolePermission {
                role_id: RoleId::from_uuid(role_id),
                permission_id: PermissionId::parse(permission_id)
                    .map_err(corrupt_domain("grants_for_roles"))?,
                value,
            });
        }
        Ok(grants)
    }

    #[instrument(
        skip(self, clear, attach),
        fields(role_id = %role_id, cleared = clear.len(), attached = attach.len()),
        err
    )]
    async fn replace_grants(
        &self,
        role_id: RoleId,
        clear: &[PermissionId],
        attach: &[RolePermission],
    ) -> Result<(), StoreError> {
        ensure_grants_belong_to(role_id, attach)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("replace_grants.begin", e))?;

        let locked = sqlx::query("SELECT role_id FROM roles WHERE role_id = $1 FOR UPDATE")
            .bind(role_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_grants.lock", e))?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }

        let cleared: Vec<String> = clear.iter().map(|p| p.as_str().to_string()).collect();
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = ANY($2)")
            .bind(role_id.as_uuid())
            .bind(cleared)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_grants.detach", e))?;

        for grant in attach {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (role_id, permission_id) DO UPDATE SET value = EXCLUDED.value
                "#,
            )
            .bind(role_id.as_uuid())
            .bind(grant.permission_id.as_str())
            .bind(grant.value)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_grants.attach", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("replace_grants.commit", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SeedStore for PostgresStore {
    async fn upsert_board(&self, board: &Board) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO boards (board_uri, title) VALUES ($1, $2) ON CONFLICT (board_uri) DO NOTHING",
        )
        .bind(board.board_uri.as_str())
        .bind(&board.title)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_board", e))?;
        Ok(())
    }

    async fn upsert_group(&self, group_id: &str, display_order: i32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO permission_groups (group_id, display_order) VALUES ($1, $2)
            ON CONFLICT (group_id) DO UPDATE SET display_order = EXCLUDED.display_order
            "#,
        )
        .bind(group_id)
        .bind(display_order)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_group", e))?;
        Ok(())
    }

    async fn upsert_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO permissions (permission_id, group_id) VALUES ($1, $2)
            ON CONFLICT (permission_id) DO UPDATE SET group_id = EXCLUDED.group_id
            "#,
        )
        .bind(permission.permission_id.as_str())
        .bind(&permission.group_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_permission", e))?;
        Ok(())
    }

    async fn site_role(&self, caste: &Caste) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE board_uri IS NULL AND caste = $1"
        ))
        .bind(caste.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("site_role", e))?;

        row.map(|row| role_from_row("site_role", &row)).transpose()
    }

    async fn seed_grant(&self, grant: &RolePermission) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id, value) VALUES ($1, $2, $3)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(grant.role_id.as_uuid())
        .bind(grant.permission_id.as_str())
        .bind(grant.value)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("seed_grant", e))?;
        Ok(())
    }
}

/// Map SQLx errors to `StoreError`, keeping the failing operation in the message.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
