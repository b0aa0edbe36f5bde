use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use tokio::task;

use super::refresh_token::RefreshTokenRepository;
use crate::config::SecurityConfig;
use crate::domain::Role;
use crate::entities::users;

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: String,
    pub activated: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            surname: model.surname,
            email: model.email,
            phone_number: model.phone_number,
            role: model.role,
            activated: model.activated,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub activated: bool,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let count = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .count(&self.conn)
            .await
            .context("Failed to count users by email")?;

        Ok(count > 0)
    }

    /// Current password hash, used to fingerprint password reset tokens.
    pub async fn password_hash(&self, id: i32) -> Result<Option<String>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password hash")?;

        Ok(user.map(|u| u.password_hash))
    }

    pub async fn create(&self, new_user: NewUser, config: &SecurityConfig) -> Result<User> {
        let password = new_user.password.clone();
        let config = config.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            name: Set(new_user.name),
            surname: Set(new_user.surname),
            email: Set(new_user.email),
            password_hash: Set(password_hash),
            phone_number: Set(new_user.phone_number),
            role: Set(new_user.role.as_str().to_string()),
            activated: Set(new_user.activated),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    /// Verify password for a user and return them on success.
    /// Note: This uses `spawn_blocking` because Argon2 hashing is CPU-intensive
    /// and would block the async runtime if run directly.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(None);
        };

        let password_hash = user.password_hash.clone();
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || verify_hash(&password_hash, &password))
            .await
            .context("Password verification task panicked")??;

        Ok(is_valid.then(|| User::from(user)))
    }

    /// Marks the account as activated. Returns false when the user is gone.
    pub async fn activate(&self, id: i32) -> Result<bool> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for activation")?
        else {
            return Ok(false);
        };

        if user.activated {
            return Ok(true);
        }

        let mut active: users::ActiveModel = user.into();
        active.activated = Set(true);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(true)
    }

    /// Replaces the password hash and revokes every refresh token of the user
    /// in one transaction. Returns the number of revoked tokens.
    pub async fn reset_password(
        &self,
        id: i32,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<u64> {
        let password = new_password.to_string();
        let config = config.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .context("Password hashing task panicked")??;

        let txn = self.conn.begin().await?;

        let user = users::Entity::find_by_id(id)
            .one(&txn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&txn).await?;

        let revoked = RefreshTokenRepository::revoke_all_for_user(&txn, id).await?;

        txn.commit().await?;
        Ok(revoked)
    }

    /// Grants the admin role and activates the account.
    pub async fn promote_to_admin(&self, id: i32) -> Result<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for promotion")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.role = Set(Role::Admin.as_str().to_string());
        active.activated = Set(true);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }
}

/// Hash a secret using Argon2id with the configured params.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Check a secret against a stored PHC hash. Params are read from the hash.
pub fn verify_hash(hash: &str, secret: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}
