use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{Doctor, Session, Stage, Storage, User};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if config.path.as_os_str() == ":memory:" {
            return Self::new_in_memory().await;
        }

        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory database (tests and dry runs)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        // A single connection that never expires, otherwise the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn session_exists(&self, id: &str) -> StorageResult<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_user(&self, user: &User) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, username, email, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, name, username, email, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn create_doctor(&self, doctor: &Doctor) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO doctors (id, name, gender, description, email, username)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doctor.id)
        .bind(&doctor.name)
        .bind(&doctor.gender)
        .bind(&doctor.description)
        .bind(&doctor.email)
        .bind(&doctor.username)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_doctor(&self, id: &str) -> StorageResult<Option<Doctor>> {
        let row: Option<DoctorRow> = sqlx::query_as(
            r#"
            SELECT id, name, gender, description, email, username
            FROM doctors
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn create_session(&self, session: &Session) -> StorageResult<()> {
        let messages = to_json(&session.id, &session.messages)?;
        let symptoms = to_json(&session.id, &session.extracted_symptoms)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, doctor_id, session_order, type_ques, stage, progress,
                                  next_for_id_que, current_disorder, finished, extracted_symptoms,
                                  messages, start_date, end_date, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.doctor_id)
        .bind(session.order)
        .bind(&session.type_ques)
        .bind(i64::from(session.stage.number()))
        .bind(session.progress)
        .bind(session.next_for_id_que)
        .bind(session.current_disorder)
        .bind(session.finished)
        .bind(&symptoms)
        .bind(&messages)
        .bind(session.start_date.to_rfc3339())
        .bind(session.end_date.map(|d| d.to_rfc3339()))
        .bind(session.version)
        .execute(&self.pool)
        .await?;

        debug!(session_id = %session.id, user_id = %session.user_id, "Session inserted");
        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, doctor_id, session_order, type_ques, stage, progress,
                   next_for_id_que, current_disorder, finished, extracted_symptoms,
                   messages, start_date, end_date, version
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn get_user_sessions(&self, user_id: &str) -> StorageResult<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, doctor_id, session_order, type_ques, stage, progress,
                   next_for_id_que, current_disorder, finished, extracted_symptoms,
                   messages, start_date, end_date, version
            FROM sessions
            WHERE user_id = ?
            ORDER BY session_order ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn update_session(&self, session: &Session) -> StorageResult<()> {
        let messages = to_json(&session.id, &session.messages)?;
        let symptoms = to_json(&session.id, &session.extracted_symptoms)?;

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET stage = ?, progress = ?, next_for_id_que = ?, current_disorder = ?, finished = ?,
                extracted_symptoms = ?, messages = ?, end_date = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(i64::from(session.stage.number()))
        .bind(session.progress)
        .bind(session.next_for_id_que)
        .bind(session.current_disorder)
        .bind(session.finished)
        .bind(&symptoms)
        .bind(&messages)
        .bind(session.end_date.map(|d| d.to_rfc3339()))
        .bind(&session.id)
        .bind(session.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if self.session_exists(&session.id).await? {
                return Err(StorageError::VersionConflict {
                    session_id: session.id.clone(),
                    expected: session.version,
                });
            }
            return Err(StorageError::SessionNotFound {
                session_id: session.id.clone(),
            });
        }

        Ok(())
    }
}

fn to_json<T: serde::Serialize>(id: &str, value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Query {
        message: format!("Failed to serialize session {}: {}", id, e),
    })
}

fn parse_timestamp(id: &str, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt {
            id: id.to_string(),
            message: format!("bad timestamp '{}': {}", value, e),
        })
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    username: String,
    email: String,
    created_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> StorageResult<Self> {
        let created_at = parse_timestamp(&row.id, &row.created_at)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            username: row.username,
            email: row.email,
            created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DoctorRow {
    id: String,
    name: String,
    gender: String,
    description: Option<String>,
    email: String,
    username: String,
}

impl From<DoctorRow> for Doctor {
    fn from(row: DoctorRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            gender: row.gender,
            description: row.description,
            email: row.email,
            username: row.username,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    doctor_id: String,
    session_order: i64,
    type_ques: String,
    stage: i64,
    progress: f64,
    next_for_id_que: bool,
    current_disorder: i64,
    finished: bool,
    extracted_symptoms: String,
    messages: String,
    start_date: String,
    end_date: Option<String>,
    version: i64,
}

impl TryFrom<SessionRow> for Session {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> StorageResult<Self> {
        let corrupt = |message: String| StorageError::Corrupt {
            id: row.id.clone(),
            message,
        };

        let stage = u8::try_from(row.stage)
            .map_err(|e| e.to_string())
            .and_then(Stage::try_from)
            .map_err(&corrupt)?;
        let messages = serde_json::from_str(&row.messages)
            .map_err(|e| corrupt(format!("bad messages: {}", e)))?;
        let extracted_symptoms = serde_json::from_str(&row.extracted_symptoms)
            .map_err(|e| corrupt(format!("bad extracted symptoms: {}", e)))?;
        let start_date = parse_timestamp(&row.id, &row.start_date)?;
        let end_date = row
            .end_date
            .as_deref()
            .map(|d| parse_timestamp(&row.id, d))
            .transpose()?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            doctor_id: row.doctor_id,
            order: row.session_order,
            type_ques: row.type_ques,
            stage,
            progress: row.progress,
            next_for_id_que: row.next_for_id_que,
            current_disorder: row.current_disorder,
            finished: row.finished,
            extracted_symptoms,
            messages,
            start_date,
            end_date,
            version: row.version,
        })
    }
}
