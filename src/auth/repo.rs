use axum::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::hash_password_async;
use crate::error::ApiError;

pub const NAME_MAX_LEN: usize = 30;
pub const PASSWORD_MIN_LEN: usize = 8;

/// Closed set of authorization roles. Only stored; no role business rules live here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
    Moderator,
}

/// Persisted user record. Pure data: hashing, token signing and recovery-token
/// generation live in their own modules. The password digest and recovery
/// fields never serialize into a response body.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub role: Role,
    #[serde(skip_serializing, default)]
    pub recovery_token_hash: Option<String>,
    #[serde(skip_serializing, default)]
    pub recovery_token_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Recovery-field transition carried by a [`UserPatch`]. The hash and expiry
/// are always set or cleared together.
#[derive(Debug, Clone)]
pub enum RecoveryUpdate {
    Set {
        token_hash: String,
        expires_at: OffsetDateTime,
    },
    Clear,
}

/// Explicit change-set for `save`. Replaces implicit pre-save lifecycle hooks:
/// the store re-hashes exactly when `password` carries a new plaintext, never
/// on unrelated field updates.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub password: Option<String>,
    pub recovery: Option<RecoveryUpdate>,
}

impl UserPatch {
    pub fn password(plain: impl Into<String>) -> Self {
        Self {
            password: Some(plain.into()),
            recovery: None,
        }
    }

    pub fn set_recovery(token_hash: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self {
            password: None,
            recovery: Some(RecoveryUpdate::Set {
                token_hash: token_hash.into(),
                expires_at,
            }),
        }
    }

    pub fn clear_recovery() -> Self {
        Self {
            password: None,
            recovery: Some(RecoveryUpdate::Clear),
        }
    }

    /// Password reset: new credential and recovery-field clear commit as a
    /// single state transition.
    pub fn password_and_clear_recovery(plain: impl Into<String>) -> Self {
        Self {
            password: Some(plain.into()),
            recovery: Some(RecoveryUpdate::Clear),
        }
    }
}

/// Credential store contract. Default queries omit the password digest;
/// login asks for it explicitly.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError>;

    async fn find_by_email(
        &self,
        email: &str,
        with_password: bool,
    ) -> Result<Option<User>, ApiError>;

    async fn find_by_id(&self, id: Uuid, with_password: bool) -> Result<Option<User>, ApiError>;

    /// Apply a change-set. `validate=false` skips input validation and exists
    /// for the forgot-password rollback path, which must be able to clear
    /// recovery fields without re-running full validation.
    async fn save(&self, id: Uuid, patch: UserPatch, validate: bool) -> Result<User, ApiError>;

    /// Redemption lookup: digest equality AND strictly unexpired, in one
    /// query. A matching-but-expired token fails identically to a
    /// non-matching one.
    async fn find_by_recovery(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, ApiError>;
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_new_user(name: &str, email: &str, password: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(ApiError::validation("Name must be less than 30"));
    }
    if email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if !is_valid_email(email) {
        return Err(ApiError::validation("Invalid email"));
    }
    validate_password(password)
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < PASSWORD_MIN_LEN {
        return Err(ApiError::validation("Password must be at least 8 chars"));
    }
    Ok(())
}

fn validate_patch(patch: &UserPatch) -> Result<(), ApiError> {
    if let Some(plain) = &patch.password {
        validate_password(plain)?;
    }
    Ok(())
}

fn strip_password(mut user: User) -> User {
    user.password_hash = None;
    user
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, \
     recovery_token_hash, recovery_token_expires, created_at, updated_at";

/// Postgres-backed credential store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        validate_new_user(name, email, password)?;

        if self.find_by_email(email, false).await?.is_some() {
            return Err(ApiError::conflict("User already exists"));
        }

        let hash = hash_password_async(password.to_string()).await?;

        let res = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash) \
             VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email)
        .bind(&hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(strip_password(user)),
            // Backstop for the unique index winning a race with the pre-check.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ApiError::conflict("User already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(
        &self,
        email: &str,
        with_password: bool,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user.map(|u| if with_password { u } else { strip_password(u) }))
    }

    async fn find_by_id(&self, id: Uuid, with_password: bool) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user.map(|u| if with_password { u } else { strip_password(u) }))
    }

    async fn save(&self, id: Uuid, patch: UserPatch, validate: bool) -> Result<User, ApiError> {
        if validate {
            validate_patch(&patch)?;
        }

        // Re-hash only when the plaintext actually changed in this save.
        let new_hash = match patch.password {
            Some(plain) => Some(hash_password_async(plain).await?),
            None => None,
        };

        let (recovery_changed, rec_hash, rec_exp) = match patch.recovery {
            Some(RecoveryUpdate::Set {
                token_hash,
                expires_at,
            }) => (true, Some(token_hash), Some(expires_at)),
            Some(RecoveryUpdate::Clear) => (true, None, None),
            None => (false, None, None),
        };

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                 password_hash = COALESCE($2, password_hash), \
                 recovery_token_hash = CASE WHEN $3 THEN $4 ELSE recovery_token_hash END, \
                 recovery_token_expires = CASE WHEN $3 THEN $5 ELSE recovery_token_expires END, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(new_hash)
        .bind(recovery_changed)
        .bind(rec_hash)
        .bind(rec_exp)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

        Ok(strip_password(user))
    }

    async fn find_by_recovery(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE recovery_token_hash = $1 AND recovery_token_expires > $2"
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(user.map(strip_password))
    }
}

/// In-memory credential store backing the handler tests, the same way the
/// storage client has a fake counterpart.
#[derive(Default)]
pub struct MemoryUserStore {
    users: std::sync::RwLock<std::collections::HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        validate_new_user(name, email, password)?;

        if self.find_by_email(email, false).await?.is_some() {
            return Err(ApiError::conflict("User already exists"));
        }

        let hash = hash_password_async(password.to_string()).await?;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: Some(hash),
            role: Role::User,
            recovery_token_hash: None,
            recovery_token_expires: None,
            created_at: now,
            updated_at: now,
        };

        let mut users = self.users.write().expect("lock poisoned");
        users.insert(user.id, user.clone());
        Ok(strip_password(user))
    }

    async fn find_by_email(
        &self,
        email: &str,
        with_password: bool,
    ) -> Result<Option<User>, ApiError> {
        let users = self.users.read().expect("lock poisoned");
        Ok(users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .map(|u| if with_password { u } else { strip_password(u) }))
    }

    async fn find_by_id(&self, id: Uuid, with_password: bool) -> Result<Option<User>, ApiError> {
        let users = self.users.read().expect("lock poisoned");
        Ok(users
            .get(&id)
            .cloned()
            .map(|u| if with_password { u } else { strip_password(u) }))
    }

    async fn save(&self, id: Uuid, patch: UserPatch, validate: bool) -> Result<User, ApiError> {
        if validate {
            validate_patch(&patch)?;
        }

        // Hash outside the lock; argon2 runs on the blocking pool.
        let new_hash = match patch.password {
            Some(plain) => Some(hash_password_async(plain).await?),
            None => None,
        };

        let mut users = self.users.write().expect("lock poisoned");
        let user = users
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        if let Some(hash) = new_hash {
            user.password_hash = Some(hash);
        }
        match patch.recovery {
            Some(RecoveryUpdate::Set {
                token_hash,
                expires_at,
            }) => {
                user.recovery_token_hash = Some(token_hash);
                user.recovery_token_expires = Some(expires_at);
            }
            Some(RecoveryUpdate::Clear) => {
                user.recovery_token_hash = None;
                user.recovery_token_expires = None;
            }
            None => {}
        }
        user.updated_at = OffsetDateTime::now_utc();

        Ok(strip_password(user.clone()))
    }

    async fn find_by_recovery(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, ApiError> {
        let users = self.users.read().expect("lock poisoned");
        Ok(users
            .values()
            .find(|u| {
                u.recovery_token_hash.as_deref() == Some(token_hash)
                    && u.recovery_token_expires.map(|exp| exp > now).unwrap_or(false)
            })
            .cloned()
            .map(strip_password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use time::Duration;

    async fn store_with_user() -> (MemoryUserStore, User) {
        let store = MemoryUserStore::new();
        let user = store
            .create("Ann", "ann@x.com", "secret123")
            .await
            .expect("create");
        (store, user)
    }

    #[tokio::test]
    async fn create_validates_input() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.create("", "a@x.com", "secret123").await,
            Err(ApiError::Validation(_))
        ));
        let long_name = "x".repeat(31);
        assert!(matches!(
            store.create(&long_name, "a@x.com", "secret123").await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            store.create("Ann", "", "secret123").await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            store.create("Ann", "not-an-email", "secret123").await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            store.create("Ann", "a@x.com", "short").await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (store, _) = store_with_user().await;
        let err = store
            .create("Another Ann", "ann@x.com", "secret456")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(err.to_string(), "User already exists");
    }

    #[tokio::test]
    async fn create_strips_and_stores_the_digest() {
        let (store, created) = store_with_user().await;
        assert!(created.password_hash.is_none());

        let fetched = store
            .find_by_email("ann@x.com", true)
            .await
            .expect("query")
            .expect("present");
        let hash = fetched.password_hash.expect("digest stored");
        assert_ne!(hash, "secret123");
        assert!(verify_password("secret123", &hash).expect("verify"));
    }

    #[tokio::test]
    async fn default_queries_omit_the_digest() {
        let (store, user) = store_with_user().await;
        let by_email = store
            .find_by_email("ann@x.com", false)
            .await
            .expect("query")
            .expect("present");
        assert!(by_email.password_hash.is_none());
        let by_id = store
            .find_by_id(user.id, false)
            .await
            .expect("query")
            .expect("present");
        assert!(by_id.password_hash.is_none());

        let by_id_with = store
            .find_by_id(user.id, true)
            .await
            .expect("query")
            .expect("present");
        assert!(by_id_with.password_hash.is_some());
    }

    #[tokio::test]
    async fn recovery_only_save_never_touches_the_digest() {
        let (store, user) = store_with_user().await;
        let before = store
            .find_by_email("ann@x.com", true)
            .await
            .expect("query")
            .expect("present")
            .password_hash;

        let expires = OffsetDateTime::now_utc() + Duration::minutes(20);
        store
            .save(user.id, UserPatch::set_recovery("digest", expires), false)
            .await
            .expect("save");

        let after = store
            .find_by_email("ann@x.com", true)
            .await
            .expect("query")
            .expect("present")
            .password_hash;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn password_save_rehashes() {
        let (store, user) = store_with_user().await;
        store
            .save(user.id, UserPatch::password("newsecret1"), true)
            .await
            .expect("save");
        let hash = store
            .find_by_email("ann@x.com", true)
            .await
            .expect("query")
            .expect("present")
            .password_hash
            .expect("digest");
        assert!(verify_password("newsecret1", &hash).expect("verify"));
        assert!(!verify_password("secret123", &hash).expect("verify"));
    }

    #[tokio::test]
    async fn save_with_validation_rejects_short_password() {
        let (store, user) = store_with_user().await;
        let err = store
            .save(user.id, UserPatch::password("short"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn redemption_requires_match_and_unexpired() {
        let (store, user) = store_with_user().await;
        let now = OffsetDateTime::now_utc();

        store
            .save(
                user.id,
                UserPatch::set_recovery("digest", now + Duration::minutes(20)),
                false,
            )
            .await
            .expect("save");

        // Wrong token.
        assert!(store
            .find_by_recovery("other", now)
            .await
            .expect("query")
            .is_none());
        // Matching and unexpired.
        assert!(store
            .find_by_recovery("digest", now)
            .await
            .expect("query")
            .is_some());
        // Expiry is a strict bound.
        assert!(store
            .find_by_recovery("digest", now + Duration::minutes(20))
            .await
            .expect("query")
            .is_none());
        assert!(store
            .find_by_recovery("digest", now + Duration::minutes(21))
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn reset_patch_commits_password_and_clear_together() {
        let (store, user) = store_with_user().await;
        let now = OffsetDateTime::now_utc();
        store
            .save(
                user.id,
                UserPatch::set_recovery("digest", now + Duration::minutes(20)),
                false,
            )
            .await
            .expect("save");

        store
            .save(
                user.id,
                UserPatch::password_and_clear_recovery("newsecret1"),
                true,
            )
            .await
            .expect("save");

        assert!(store
            .find_by_recovery("digest", now)
            .await
            .expect("query")
            .is_none());
        let hash = store
            .find_by_email("ann@x.com", true)
            .await
            .expect("query")
            .expect("present")
            .password_hash
            .expect("digest");
        assert!(verify_password("newsecret1", &hash).expect("verify"));
    }

    #[test]
    fn user_json_never_contains_credential_fields() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ann".into(),
            email: "ann@x.com".into(),
            password_hash: Some("digest".into()),
            role: Role::User,
            recovery_token_hash: Some("digest".into()),
            recovery_token_expires: Some(OffsetDateTime::now_utc()),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).expect("serialize");
        assert!(!json.contains("password"));
        assert!(!json.contains("recovery"));
        assert!(!json.contains("digest"));
        assert!(json.contains("ann@x.com"));
        assert!(json.contains("USER"));
    }
}
