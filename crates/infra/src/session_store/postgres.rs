//! Postgres-backed session store.
//!
//! ## Atomic rotation
//!
//! `mark_rotated` is a single `UPDATE ... WHERE session_id = $1 AND state IN
//! ('active', 'rotated')` whose `SET` list branches on whether the stored
//! `current_token_id` equals the presented one. The row lock serializes
//! concurrent exchanges; the loser re-evaluates against the winner's row,
//! sees a different token id and revokes the session.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `DuplicateSession` |
//! | Database (check constraint violation) | `23514` | `Rejected` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolClosed / Io / other | N/A | `Unavailable` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use tenantgate_auth::{RotationOutcome, Session, SessionState, SessionStore, StoreError};
use tenantgate_core::{BranchId, OrgId, SessionId, TokenId, UserId};

const SCHEMA: &str = include_str!("../../migrations/0001_create_sessions.sql");

const SESSION_COLUMNS: &str = "session_id, user_id, org_id, branch_id, state, current_token_id, \
     rotation_count, created_at, expires_at, last_rotated_at, ended_at";

#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    pool: Arc<PgPool>,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the `sessions` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    #[instrument(skip(self, session), fields(session_id = %session.session_id), err)]
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, user_id, org_id, branch_id, state, current_token_id,
                rotation_count, created_at, expires_at, last_rotated_at, ended_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.session_id.as_uuid())
        .bind(session.user_id.as_uuid())
        .bind(session.org_id.as_uuid())
        .bind(session.branch_id.map(uuid::Uuid::from))
        .bind(session.state.as_str())
        .bind(session.current_token_id.as_uuid())
        .bind(i32::try_from(session.rotation_count).unwrap_or(i32::MAX))
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.last_rotated_at)
        .bind(session.ended_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_by_session_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_by_session_id", e))?;
        row.as_ref().map(session_from_row).transpose()
    }

    #[instrument(skip(self, presented, next), err)]
    async fn mark_rotated(
        &self,
        id: SessionId,
        presented: TokenId,
        next: TokenId,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, StoreError> {
        let sql = format!(
            r#"
            UPDATE sessions SET
                state            = CASE WHEN current_token_id = $2 THEN 'rotated' ELSE 'revoked' END,
                current_token_id = CASE WHEN current_token_id = $2 THEN $3 ELSE current_token_id END,
                rotation_count   = CASE WHEN current_token_id = $2 THEN rotation_count + 1 ELSE rotation_count END,
                last_rotated_at  = CASE WHEN current_token_id = $2 THEN $4 ELSE last_rotated_at END,
                ended_at         = CASE WHEN current_token_id = $2 THEN ended_at ELSE $4 END
            WHERE session_id = $1 AND state IN ('active', 'rotated')
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(presented.as_uuid())
            .bind(next.as_uuid())
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_rotated", e))?;

        match row {
            Some(row) => {
                let session = session_from_row(&row)?;
                if session.state == SessionState::Rotated && session.current_token_id == next {
                    Ok(RotationOutcome::Rotated(session))
                } else {
                    Ok(RotationOutcome::ReuseDetected)
                }
            }
            None => Ok(match self.get_by_session_id(id).await? {
                Some(session) => RotationOutcome::NotLive(session.state),
                None => RotationOutcome::NotFound,
            }),
        }
    }

    #[instrument(skip(self), err)]
    async fn mark_revoked(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.end(id, SessionState::Revoked, now).await
    }

    #[instrument(skip(self), err)]
    async fn mark_expired(&self, id: SessionId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.end(id, SessionState::Expired, now).await
    }

    #[instrument(skip(self), err)]
    async fn is_active(&self, id: SessionId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM sessions WHERE session_id = $1 AND state IN ('active', 'rotated'))",
        )
        .bind(id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("is_active", e))
    }

    #[instrument(skip(self), err)]
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET state = 'expired', ended_at = $1
            WHERE state IN ('active', 'rotated') AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("expire_stale", e))?;
        Ok(result.rows_affected())
    }
}

impl PostgresSessionStore {
    async fn end(&self, id: SessionId, terminal: SessionState, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET state = $2, ended_at = $3
            WHERE session_id = $1 AND state IN ('active', 'rotated')
            "#,
        )
        .bind(id.as_uuid())
        .bind(terminal.as_str())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("end_session", e))?;
        Ok(result.rows_affected() == 1)
    }
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<Session, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Unavailable(format!("failed to decode session row: {e}"));

    let state: String = row.try_get("state").map_err(decode)?;
    let state = SessionState::parse(&state)
        .ok_or_else(|| StoreError::Unavailable(format!("unknown session state '{state}'")))?;
    let rotation_count: i32 = row.try_get("rotation_count").map_err(decode)?;
    let branch_id: Option<uuid::Uuid> = row.try_get("branch_id").map_err(decode)?;

    Ok(Session {
        session_id: SessionId::from_uuid(row.try_get("session_id").map_err(decode)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(decode)?),
        branch_id: branch_id.map(BranchId::from_uuid),
        created_at: row.try_get("created_at").map_err(decode)?,
        expires_at: row.try_get("expires_at").map_err(decode)?,
        state,
        last_rotated_at: row.try_get("last_rotated_at").map_err(decode)?,
        ended_at: row.try_get("ended_at").map_err(decode)?,
        current_token_id: TokenId::from_uuid(row.try_get("current_token_id").map_err(decode)?),
        rotation_count: u32::try_from(rotation_count).unwrap_or(0),
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::DuplicateSession,
                Some("23514") => StoreError::Rejected(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}
