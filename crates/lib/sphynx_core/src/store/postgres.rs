//! PostgreSQL store backed by sqlx.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{AgentStore, StoreError, UserDirectory};
use crate::models::{Agent, AgentConfig, AgentStatus, User, UserRole};

/// Both store traits over one connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

type UserRow = (
    Uuid,
    String,
    String,
    String,
    String,
    bool,
    bool,
    bool,
    bool,
    Vec<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

type AgentRow = (
    Uuid,
    String,
    String,
    Json<AgentConfig>,
    String,
    Uuid,
    DateTime<Utc>,
    DateTime<Utc>,
);

const USER_SELECT: &str = "SELECT u.id, u.first_name, u.last_name, u.email, u.password_hash, \
     u.enabled, u.account_non_expired, u.account_non_locked, u.credentials_non_expired, \
     COALESCE(array_agg(r.role) FILTER (WHERE r.role IS NOT NULL), '{}') AS roles, \
     u.created_at, u.updated_at \
     FROM users u LEFT JOIN user_roles r ON r.user_id = u.id";

const AGENT_SELECT: &str = "SELECT id, name, status, config, activation_token, user_id, \
     created_at, updated_at FROM agents";

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (
        id,
        first_name,
        last_name,
        email,
        password_hash,
        enabled,
        account_non_expired,
        account_non_locked,
        credentials_non_expired,
        role_names,
        created_at,
        updated_at,
    ) = row;
    let roles = role_names
        .iter()
        .map(|r| UserRole::parse(r).ok_or_else(|| StoreError::Corrupt(format!("role {r}"))))
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(User {
        id,
        first_name,
        last_name,
        email,
        password_hash,
        enabled,
        account_non_expired,
        account_non_locked,
        credentials_non_expired,
        roles,
        created_at,
        updated_at,
    })
}

fn agent_from_row(row: AgentRow) -> Result<Agent, StoreError> {
    let (id, name, status, Json(config), activation_token, user_id, created_at, updated_at) = row;
    let status = AgentStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("agent status {status}")))?;
    Ok(Agent {
        id,
        name,
        status,
        config,
        activation_token,
        user_id,
        created_at,
        updated_at,
    })
}

fn agents_from_rows(rows: Vec<AgentRow>) -> Result<Vec<Agent>, StoreError> {
    rows.into_iter().map(agent_from_row).collect()
}

/// Translate constraint violations into domain-level store errors.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return StoreError::ForeignKey(db.message().to_string());
        }
    }
    StoreError::DbError(err)
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("{USER_SELECT} WHERE u.id = $1 GROUP BY u.id");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("{USER_SELECT} WHERE u.email = $1 GROUP BY u.id");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(user_from_row).transpose()
    }

    async fn save_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO users (id, first_name, last_name, email, password_hash, enabled, \
             account_non_expired, account_non_locked, credentials_non_expired, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET first_name = EXCLUDED.first_name, \
             last_name = EXCLUDED.last_name, email = EXCLUDED.email, \
             password_hash = EXCLUDED.password_hash, enabled = EXCLUDED.enabled, \
             account_non_expired = EXCLUDED.account_non_expired, \
             account_non_locked = EXCLUDED.account_non_locked, \
             credentials_non_expired = EXCLUDED.credentials_non_expired, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.enabled)
        .bind(user.account_non_expired)
        .bind(user.account_non_locked)
        .bind(user.credentials_non_expired)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        for role in &user.roles {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                .bind(user.id)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(user)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn user_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let sql = format!("{USER_SELECT} GROUP BY u.id ORDER BY u.id OFFSET $1 LIMIT $2");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(user_from_row).collect()
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AgentStore for PgStore {
    async fn find_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        let sql = format!("{AGENT_SELECT} WHERE id = $1");
        let row = sqlx::query_as::<_, AgentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(agent_from_row).transpose()
    }

    async fn find_agent_by_activation_token(
        &self,
        token: &str,
    ) -> Result<Option<Agent>, StoreError> {
        let sql = format!("{AGENT_SELECT} WHERE activation_token = $1");
        let row = sqlx::query_as::<_, AgentRow>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(agent_from_row).transpose()
    }

    async fn find_stale_agents(
        &self,
        before: DateTime<Utc>,
        exclude_status: AgentStatus,
    ) -> Result<Vec<Agent>, StoreError> {
        let sql = format!("{AGENT_SELECT} WHERE updated_at < $1 AND status <> $2 ORDER BY id");
        let rows = sqlx::query_as::<_, AgentRow>(&sql)
            .bind(before)
            .bind(exclude_status.as_str())
            .fetch_all(&self.pool)
            .await?;
        agents_from_rows(rows)
    }

    async fn save_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        // user_id and created_at are left out of the update set.
        let row = sqlx::query_as::<_, AgentRow>(
            "INSERT INTO agents (id, name, status, config, activation_token, user_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, status = EXCLUDED.status, \
             config = EXCLUDED.config, activation_token = EXCLUDED.activation_token, \
             updated_at = EXCLUDED.updated_at \
             RETURNING id, name, status, config, activation_token, user_id, created_at, updated_at",
        )
        .bind(agent.id)
        .bind(&agent.name)
        .bind(agent.status.as_str())
        .bind(Json(&agent.config))
        .bind(&agent.activation_token)
        .bind(agent.user_id)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;
        agent_from_row(row)
    }

    async fn save_agents(
        &self,
        agents: &[Agent],
        stale_before: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        if agents.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for agent in agents {
            let result = sqlx::query(
                r#"
                UPDATE agents SET status = $2, updated_at = $3
                WHERE id = $1 AND updated_at < $4 AND status <> $2
                "#,
            )
            .bind(agent.id)
            .bind(agent.status.as_str())
            .bind(agent.updated_at)
            .bind(stale_before)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(usize::try_from(written).unwrap_or(usize::MAX))
    }

    async fn delete_agent(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn agent_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM agents WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_agents_by_owner(&self, user_id: Uuid) -> Result<Vec<Agent>, StoreError> {
        let sql = format!("{AGENT_SELECT} WHERE user_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, AgentRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        agents_from_rows(rows)
    }

    async fn find_agents_by_name(&self, name: &str) -> Result<Vec<Agent>, StoreError> {
        let sql = format!("{AGENT_SELECT} WHERE name = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, AgentRow>(&sql)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
        agents_from_rows(rows)
    }

    async fn list_agents(&self, offset: i64, limit: i64) -> Result<Vec<Agent>, StoreError> {
        let sql = format!("{AGENT_SELECT} ORDER BY id OFFSET $1 LIMIT $2");
        let rows = sqlx::query_as::<_, AgentRow>(&sql)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        agents_from_rows(rows)
    }

    async fn touch_agent(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE agents SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
