//! User Storage
//! Mission: Persist user accounts and their current refresh token with SQLite

use crate::auth::models::{NewUser, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, google_id, refresh_token, created_at";

/// Failure modes of `CredentialStore::create_user`
#[derive(Debug)]
pub enum CreateUserError {
    /// Username, email or Google account already taken
    Duplicate,
    Other(anyhow::Error),
}

impl fmt::Display for CreateUserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateUserError::Duplicate => write!(f, "User already exists"),
            CreateUserError::Other(e) => write!(f, "Failed to create user: {:#}", e),
        }
    }
}

impl std::error::Error for CreateUserError {}

impl From<anyhow::Error> for CreateUserError {
    fn from(e: anyhow::Error) -> Self {
        CreateUserError::Other(e)
    }
}

/// Persistence boundary for user records.
///
/// Each call is one atomic read or single-record write; concurrent writers to
/// the same record resolve last-writer-wins.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>>;

    /// First user whose email or username matches either value
    async fn find_by_email_or_username(&self, email: &str, username: &str)
        -> Result<Option<User>>;

    async fn create_user(&self, new_user: NewUser) -> Result<User, CreateUserError>;

    /// All users, oldest first (admin listing)
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Compare a plaintext password against the user's stored hash
    async fn verify_password(&self, user: &User, password: &str) -> Result<bool>;

    /// Login lookup: the user if `email` exists and `password` matches.
    ///
    /// Unknown emails still cost one bcrypt comparison.
    async fn check_credentials(&self, email: &str, password: &str) -> Result<Option<User>>;

    /// Overwrite the stored refresh token; `None` revokes it
    async fn set_refresh_token(&self, id: &Uuid, token: Option<&str>) -> Result<()>;

    async fn link_google_account(&self, id: &Uuid, google_id: &str) -> Result<()>;
}

/// Emails are matched case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User storage with SQLite backend
pub struct SqliteUserStore {
    db_path: String,
    hash_cost: u32,
    // Compared against when there is no real hash, at the same cost.
    decoy_hash: String,
}

impl SqliteUserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        Self::with_hash_cost(db_path, DEFAULT_COST)
    }

    /// Same as `new` with an explicit bcrypt cost (tests use the minimum)
    pub fn with_hash_cost(db_path: &str, hash_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            hash_cost,
            decoy_hash: hash(Uuid::new_v4().to_string(), hash_cost)
                .context("Failed to prepare decoy hash")?,
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(db_path: &str) -> Result<Connection> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open user database at {}", db_path))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = Self::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT,
                role TEXT NOT NULL,
                google_id TEXT UNIQUE,
                refresh_token TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    async fn bcrypt_verify(&self, password: &str, password_hash: String) -> Result<bool> {
        let password = password.to_string();

        tokio::task::spawn_blocking(move || {
            verify(password, &password_hash).context("Failed to verify password")
        })
        .await
        .context("Password check task panicked")?
    }

    /// Run blocking SQLite work off the async workers
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            f(&conn)
        })
        .await
        .context("User store task panicked")?
    }

    async fn find_one<P>(&self, clause: &'static str, param: P) -> Result<Option<User>>
    where
        P: rusqlite::ToSql + Send + 'static,
    {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM users WHERE {} LIMIT 1", USER_COLUMNS, clause);
            conn.query_row(&sql, params![param], row_to_user)
                .optional()
                .context("Failed to query user")
        })
        .await
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let role_str: String = row.get(4)?;

    Ok(User {
        id,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: UserRole::from_str(&role_str).unwrap_or_default(),
        google_id: row.get(5)?,
        refresh_token: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[async_trait]
impl CredentialStore for SqliteUserStore {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        self.find_one("id = ?1", id.to_string()).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email = ?1", normalize_email(email)).await
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        self.find_one("google_id = ?1", google_id.to_string()).await
    }

    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>> {
        let email = normalize_email(email);
        let username = username.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE email = ?1 OR username = ?2 LIMIT 1",
                USER_COLUMNS
            );
            conn.query_row(&sql, params![email, username], row_to_user)
                .optional()
                .context("Failed to query user")
        })
        .await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let hash_cost = self.hash_cost;

        self.with_conn(move |conn| {
            let password_hash = match new_user.password.as_deref() {
                Some(password) => {
                    Some(hash(password, hash_cost).context("Failed to hash password")?)
                }
                None => None,
            };

            let user = User {
                id: Uuid::new_v4(),
                username: new_user.username,
                email: normalize_email(&new_user.email),
                password_hash,
                role: new_user.role,
                google_id: new_user.google_id,
                refresh_token: None,
                created_at: Utc::now().to_rfc3339(),
            };

            let inserted = conn.execute(
                "INSERT INTO users (id, username, email, password_hash, role, google_id, refresh_token, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                    user.google_id,
                    user.refresh_token,
                    user.created_at,
                ],
            );

            match inserted {
                Ok(_) => Ok(Ok(user)),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(Err(CreateUserError::Duplicate))
                }
                Err(e) => Err(anyhow::Error::new(e).context("Failed to insert user")),
            }
        })
        .await?
        .map(|user| {
            info!(user_id = %user.id, "Created user: {} ({})", user.username, user.role.as_str());
            user
        })
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users ORDER BY created_at", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let users = stmt
                .query_map([], row_to_user)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
        .await
    }

    async fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        match &user.password_hash {
            Some(password_hash) => self.bcrypt_verify(password, password_hash.clone()).await,
            None => {
                self.bcrypt_verify(password, self.decoy_hash.clone()).await?;
                Ok(false)
            }
        }
    }

    async fn check_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.find_by_email(email).await? else {
            self.bcrypt_verify(password, self.decoy_hash.clone()).await?;
            return Ok(None);
        };

        if self.verify_password(&user, password).await? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn set_refresh_token(&self, id: &Uuid, token: Option<&str>) -> Result<()> {
        let id = id.to_string();
        let token = token.map(str::to_string);

        self.with_conn(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE users SET refresh_token = ?1 WHERE id = ?2",
                params![token, id],
            )?;

            if rows_affected == 0 {
                anyhow::bail!("User not found");
            }
            Ok(())
        })
        .await
    }

    async fn link_google_account(&self, id: &Uuid, google_id: &str) -> Result<()> {
        let id = id.to_string();
        let google_id = google_id.to_string();

        self.with_conn(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE users SET google_id = ?1 WHERE id = ?2",
                params![google_id, id],
            )?;

            if rows_affected == 0 {
                anyhow::bail!("User not found");
            }
            Ok(())
        })
        .await
    }
}

/// Make sure an admin account exists for initial setup.
///
/// Registration never grants `admin`, so the first admin comes from here.
pub async fn seed_admin(
    store: &dyn CredentialStore,
    username: &str,
    email: &str,
    password: &str,
) -> Result<()> {
    if store.find_by_email_or_username(email, username).await?.is_some() {
        return Ok(());
    }

    let created = store
        .create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password: Some(password.to_string()),
            role: UserRole::Admin,
            google_id: None,
        })
        .await;

    match created {
        Ok(admin) => {
            info!("🔐 Admin user seeded: {} <{}>", admin.username, admin.email);
            Ok(())
        }
        Err(CreateUserError::Duplicate) => {
            warn!("Admin seed skipped, account created concurrently: {}", username);
            Ok(())
        }
        Err(CreateUserError::Other(e)) => Err(e),
    }
}
