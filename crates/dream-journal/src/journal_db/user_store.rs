//! User records behind the authentication gateway
use crate::journal_db::schema::{AuthProvider, StoredUser};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, app_id, email, password_hash, provider, provider_name, provider_subject, created_at, last_sign_in";

pub struct UserStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl UserStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    fn insert(&self, user: &StoredUser) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO users
             (id, app_id, email, password_hash, provider, provider_name, provider_subject, created_at, last_sign_in)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &user.id,
                &user.app_id,
                &user.email,
                &user.password_hash,
                user.provider.as_str(),
                &user.provider_name,
                &user.provider_subject,
                user.created_at.to_rfc3339(),
                user.last_sign_in.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert, reporting `false` when a unique index (email or federated
    /// identity) already holds a matching row.
    fn insert_if_unique(&self, user: &StoredUser) -> anyhow::Result<bool> {
        match self.insert(user) {
            Ok(()) => Ok(true),
            Err(e) if is_unique_violation(&e) => {
                warn!("Concurrent registration lost the race for user {}", user.id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn new_user(app_id: &str, provider: AuthProvider) -> StoredUser {
        let now = Utc::now();
        StoredUser {
            id: Uuid::new_v4().to_string(),
            app_id: app_id.to_string(),
            email: None,
            password_hash: None,
            provider,
            provider_name: None,
            provider_subject: None,
            created_at: now,
            last_sign_in: now,
        }
    }

    /// Returns `None` when the email is already registered for this app.
    pub fn create_password_user(
        &self,
        app_id: &str,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<Option<StoredUser>> {
        if self.find_by_email(app_id, email)?.is_some() {
            return Ok(None);
        }

        let mut user = Self::new_user(app_id, AuthProvider::Password);
        user.email = Some(normalize_email(email));
        user.password_hash = Some(password_hash.to_string());
        if !self.insert_if_unique(&user)? {
            return Ok(None);
        }

        info!("Registered password user {}", user.id);
        Ok(Some(user))
    }

    pub fn create_anonymous(&self, app_id: &str) -> anyhow::Result<StoredUser> {
        let user = Self::new_user(app_id, AuthProvider::Anonymous);
        self.insert(&user)?;
        info!("Registered anonymous user {}", user.id);
        Ok(user)
    }

    /// Same (provider, subject) always maps to the same user id.
    pub fn find_or_create_federated(
        &self,
        app_id: &str,
        provider_name: &str,
        subject: &str,
        email: Option<&str>,
    ) -> anyhow::Result<StoredUser> {
        if let Some(user) = self.find_federated(app_id, provider_name, subject)? {
            self.touch_sign_in(&user.id)?;
            return Ok(user);
        }

        let mut user = Self::new_user(app_id, AuthProvider::Federated);
        user.provider_name = Some(provider_name.to_string());
        user.provider_subject = Some(subject.to_string());
        user.email = email.map(normalize_email);
        if !self.insert_if_unique(&user)? {
            if let Some(existing) = self.find_federated(app_id, provider_name, subject)? {
                return Ok(existing);
            }
            // Email belongs to another account; keep the identity without it.
            user.email = None;
            self.insert(&user)?;
        }

        info!("Registered federated user {} via {}", user.id, provider_name);
        Ok(user)
    }

    fn find_federated(&self, app_id: &str, provider_name: &str, subject: &str) -> anyhow::Result<Option<StoredUser>> {
        let conn = self.get_conn()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE app_id = ?1 AND provider_name = ?2 AND provider_subject = ?3",
                    USER_COLUMNS
                ),
                params![app_id, provider_name, subject],
                |row| Ok(row_to_user(row)),
            )
            .optional()?
            .transpose()?;
        Ok(user)
    }

    pub fn find_by_email(&self, app_id: &str, email: &str) -> anyhow::Result<Option<StoredUser>> {
        let conn = self.get_conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE app_id = ?1 AND email = ?2", USER_COLUMNS),
                params![app_id, normalize_email(email)],
                |row| Ok(row_to_user(row)),
            )
            .optional()?
            .transpose()?;
        Ok(user)
    }

    pub fn get(&self, user_id: &str) -> anyhow::Result<Option<StoredUser>> {
        let conn = self.get_conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [user_id],
                |row| Ok(row_to_user(row)),
            )
            .optional()?
            .transpose()?;
        Ok(user)
    }

    pub fn touch_sign_in(&self, user_id: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE users SET last_sign_in = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), user_id],
        )?;
        Ok(())
    }
}

fn is_unique_violation(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(failure, _))
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn parse_datetime_safe(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!("Failed to parse stored timestamp '{}'", value);
            Utc::now()
        })
}

fn row_to_user(row: &Row) -> anyhow::Result<StoredUser> {
    let provider: String = row.get(4)?;
    let provider = AuthProvider::parse(&provider)
        .ok_or_else(|| anyhow::anyhow!("Unknown auth provider '{}'", provider))?;

    Ok(StoredUser {
        id: row.get(0)?,
        app_id: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        provider,
        provider_name: row.get(5)?,
        provider_subject: row.get(6)?,
        created_at: parse_datetime_safe(&row.get::<_, String>(7)?),
        last_sign_in: parse_datetime_safe(&row.get::<_, String>(8)?),
    })
}
