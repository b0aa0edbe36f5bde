use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use tokio::task;
use tracing::debug;

use super::user::{hash_password, verify_hash};
use crate::config::SecurityConfig;
use crate::entities::refresh_tokens;

pub struct RefreshTokenRepository {
    conn: DatabaseConnection,
}

impl RefreshTokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Stores a freshly issued refresh token.
    ///
    /// While the user already holds `max_active` live tokens, the ones closest
    /// to expiry are deleted first.
    pub async fn create(
        &self,
        user_id: i32,
        token: &str,
        jti: &str,
        expires_at: i64,
        max_active: u64,
        security: &SecurityConfig,
    ) -> Result<()> {
        let token = token.to_string();
        let security = security.clone();
        let token_hash = task::spawn_blocking(move || hash_password(&token, &security))
            .await
            .context("Token hashing task panicked")??;

        let now = chrono::Utc::now();
        let txn = self.conn.begin().await?;

        let active = refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .filter(refresh_tokens::Column::ExpiresAt.gt(now.timestamp()))
            .order_by_asc(refresh_tokens::Column::ExpiresAt)
            .order_by_asc(refresh_tokens::Column::Id)
            .all(&txn)
            .await
            .context("Failed to query active refresh tokens")?;

        let keep = usize::try_from(max_active.saturating_sub(1)).unwrap_or(usize::MAX);
        let overflow = active.len().saturating_sub(keep);
        let evicted: Vec<i32> = active.iter().take(overflow).map(|t| t.id).collect();

        if !evicted.is_empty() {
            debug!(user_id, evicted = evicted.len(), "Evicting oldest refresh tokens");
            refresh_tokens::Entity::delete_many()
                .filter(refresh_tokens::Column::Id.is_in(evicted))
                .exec(&txn)
                .await?;
        }

        refresh_tokens::ActiveModel {
            user_id: Set(user_id),
            token_hash: Set(token_hash),
            jti: Set(jti.to_string()),
            expires_at: Set(expires_at),
            revoked: Set(false),
            created_at: Set(now.to_rfc3339()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert refresh token")?;

        txn.commit().await?;
        Ok(())
    }

    pub async fn find(&self, jti: &str) -> Result<Option<refresh_tokens::Model>> {
        refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::Jti.eq(jti))
            .one(&self.conn)
            .await
            .context("Failed to query refresh token")
    }

    /// Looks up a live token by `jti` and checks the presented token against
    /// the stored hash.
    pub async fn find_valid(
        &self,
        jti: &str,
        token: &str,
        now: i64,
    ) -> Result<Option<refresh_tokens::Model>> {
        let Some(row) = self.find(jti).await? else {
            return Ok(None);
        };

        if row.revoked || row.expires_at <= now {
            return Ok(None);
        }

        let hash = row.token_hash.clone();
        let token = token.to_string();
        let matches = task::spawn_blocking(move || verify_hash(&hash, &token))
            .await
            .context("Token verification task panicked")??;

        Ok(matches.then_some(row))
    }

    /// Returns true when a live token was revoked.
    pub async fn revoke(&self, jti: &str) -> Result<bool> {
        let result = refresh_tokens::Entity::update_many()
            .col_expr(refresh_tokens::Column::Revoked, Expr::value(true))
            .filter(refresh_tokens::Column::Jti.eq(jti))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .exec(&self.conn)
            .await
            .context("Failed to revoke refresh token")?;

        Ok(result.rows_affected > 0)
    }

    /// Revokes every live token of a user on `conn`, which may be an open
    /// transaction.
    pub async fn revoke_all_for_user<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<u64> {
        let result = refresh_tokens::Entity::update_many()
            .col_expr(refresh_tokens::Column::Revoked, Expr::value(true))
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .exec(conn)
            .await
            .context("Failed to revoke refresh tokens for user")?;

        Ok(result.rows_affected)
    }

    pub async fn active_for_user(
        &self,
        user_id: i32,
        now: i64,
    ) -> Result<Vec<refresh_tokens::Model>> {
        refresh_tokens::Entity::find()
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::Revoked.eq(false))
            .filter(refresh_tokens::Column::ExpiresAt.gt(now))
            .order_by_asc(refresh_tokens::Column::ExpiresAt)
            .all(&self.conn)
            .await
            .context("Failed to query active refresh tokens")
    }

    pub async fn delete_expired(&self, now: i64) -> Result<u64> {
        let result = refresh_tokens::Entity::delete_many()
            .filter(refresh_tokens::Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to delete expired refresh tokens")?;

        Ok(result.rows_affected)
    }
}
