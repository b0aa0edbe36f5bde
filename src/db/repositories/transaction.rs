use anyhow::{Context, Result};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::transactions;

pub struct TransactionRepository {
    conn: DatabaseConnection,
}

impl TransactionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<transactions::Model>> {
        transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .order_by_desc(transactions::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query transactions for user")
    }

    pub async fn get_by_session(&self, session_id: &str) -> Result<Option<transactions::Model>> {
        transactions::Entity::find()
            .filter(transactions::Column::SessionId.eq(session_id))
            .one(&self.conn)
            .await
            .context("Failed to query transaction by session")
    }
}
