//! Storage layer for diagnostic session persistence.
//!
//! This module provides the session record and its transcript types, the
//! reference user and doctor records, and the SQLite-backed [`Storage`]
//! implementation.

mod sqlite;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// Sentinel for a symptom the user has not chosen yet.
pub const UNSELECTED: i64 = -1;

/// Sentinel for a session whose disorder has not been classified yet.
pub const UNCLASSIFIED: i64 = -1;

/// A patient account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: String,
    /// Full name.
    pub name: String,
    /// Display name used when greeting the user.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// A doctor profile a session is opened with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    /// Unique doctor identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Gender as shown in the profile.
    pub gender: String,
    /// Optional profile description.
    pub description: Option<String>,
    /// Contact email.
    pub email: String,
    /// Login name.
    pub username: String,
}

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    /// An answer from the patient.
    #[serde(rename = "user")]
    User,
    /// A transitional or acknowledgement utterance.
    #[serde(rename = "ai")]
    Ai,
    /// A newly introduced diagnostic question.
    #[serde(rename = "ai-base")]
    AiBase,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Ai => write!(f, "ai"),
            Sender::AiBase => write!(f, "ai-base"),
        }
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Who wrote the entry.
    pub sender: Sender,
    /// Entry text.
    pub content: String,
    /// Index of the diagnostic question this entry belongs to.
    pub id_que: u32,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
}

/// A symptom surfaced by the oracle for user confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSymptom {
    /// Symptom name.
    pub name: String,
    /// Oracle label identifying the symptom.
    pub label: i64,
    /// User choice, [`UNSELECTED`] until chosen.
    pub selected: i64,
    /// Association confirmed by the user.
    pub association: f64,
    /// Association probability proposed by the oracle.
    #[serde(rename = "associationByAI")]
    pub association_by_ai: f64,
}

/// Coarse phase of a diagnostic conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Stage {
    /// Stage 1: screening questions.
    #[default]
    Screening,
    /// Stage 2: disorder-specific questioning.
    DisorderFocus,
    /// Stage 3: deeper disorder-specific questioning.
    DisorderDepth,
    /// Stage 4: symptom extraction and confirmation.
    SymptomConfirmation,
}

impl Stage {
    /// Stage number as stored and reported (1-4).
    pub fn number(&self) -> u8 {
        match self {
            Stage::Screening => 1,
            Stage::DisorderFocus => 2,
            Stage::DisorderDepth => 3,
            Stage::SymptomConfirmation => 4,
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.number()
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Stage::Screening),
            2 => Ok(Stage::DisorderFocus),
            3 => Ok(Stage::DisorderDepth),
            4 => Ok(Stage::SymptomConfirmation),
            _ => Err(format!("Unknown stage: {}", value)),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A diagnostic session and its full transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Doctor the session was opened with.
    pub doctor_id: String,
    /// 1-based position among the user's sessions.
    pub order: i64,
    /// Question-set variant.
    pub type_ques: String,
    /// Current stage.
    pub stage: Stage,
    /// Normalized progress in [0, 100].
    pub progress: f64,
    /// Whether the next oracle call gets the last answer as context.
    pub next_for_id_que: bool,
    /// Latest disorder label, [`UNCLASSIFIED`] until classified.
    pub current_disorder: i64,
    /// Terminal flag.
    pub finished: bool,
    /// Symptoms surfaced on entering stage 4.
    pub extracted_symptoms: Vec<ExtractedSymptom>,
    /// Append-only transcript.
    pub messages: Vec<Message>,
    /// When the session was created.
    pub start_date: DateTime<Utc>,
    /// When the session finished.
    pub end_date: Option<DateTime<Utc>>,
    /// Revision checked on every update.
    pub version: i64,
}

impl Session {
    /// Create a new session in the screening stage.
    pub fn new(
        user_id: impl Into<String>,
        doctor_id: impl Into<String>,
        order: i64,
        type_ques: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            doctor_id: doctor_id.into(),
            order,
            type_ques: type_ques.into(),
            stage: Stage::Screening,
            progress: 0.0,
            next_for_id_que: false,
            current_disorder: UNCLASSIFIED,
            finished: false,
            extracted_symptoms: Vec::new(),
            messages: Vec::new(),
            start_date: Utc::now(),
            end_date: None,
            version: 0,
        }
    }

    /// Number of diagnostic questions introduced so far.
    pub fn question_count(&self) -> u32 {
        self.messages
            .iter()
            .filter(|m| m.sender == Sender::AiBase)
            .count() as u32
    }

    /// All user answers, in order.
    pub fn user_answers(&self) -> Vec<String> {
        self.answers_where(|_| true)
    }

    /// User answers attributed to questions after `id_que`.
    pub fn answers_after(&self, id_que: u32) -> Vec<String> {
        self.answers_where(|m| m.id_que > id_que)
    }

    /// User answers attributed to questions up to and including `id_que`.
    pub fn answers_through(&self, id_que: u32) -> Vec<String> {
        self.answers_where(|m| m.id_que <= id_que)
    }

    fn answers_where(&self, keep: impl Fn(&Message) -> bool) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.sender == Sender::User && keep(m))
            .map(|m| m.content.clone())
            .collect()
    }

    /// Append a transcript entry.
    pub fn push_message(&mut self, sender: Sender, content: impl Into<String>, id_que: u32) {
        self.messages.push(Message {
            sender,
            content: content.into(),
            id_que,
            timestamp: Utc::now(),
        });
    }

    /// Move to `stage` unless the session is already further along.
    pub fn advance_to(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    /// Mark the session finished.
    pub fn finish(&mut self) {
        self.finished = true;
        self.progress = 100.0;
        self.end_date = Some(Utc::now());
    }
}

impl User {
    /// Create a new user record
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            username: username.into(),
            email: email.into(),
            created_at: Utc::now(),
        }
    }
}

impl Doctor {
    /// Create a new doctor record
    pub fn new(
        name: impl Into<String>,
        gender: impl Into<String>,
        email: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            gender: gender.into(),
            description: None,
            email: email.into(),
            username: username.into(),
        }
    }

    /// Set the profile description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Storage trait for database operations.
///
/// Sessions are written with optimistic concurrency: [`Storage::update_session`]
/// only succeeds when the stored version matches `session.version`.
#[async_trait]
pub trait Storage: Send + Sync {
    // ========================================================================
    // Reference records
    // ========================================================================

    /// Insert a user record.
    async fn create_user(&self, user: &User) -> StorageResult<()>;
    /// Look up a user by id.
    async fn get_user(&self, id: &str) -> StorageResult<Option<User>>;
    /// Insert a doctor record.
    async fn create_doctor(&self, doctor: &Doctor) -> StorageResult<()>;
    /// Look up a doctor by id.
    async fn get_doctor(&self, id: &str) -> StorageResult<Option<Doctor>>;

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Insert a new session.
    async fn create_session(&self, session: &Session) -> StorageResult<()>;
    /// Look up a session by id.
    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>>;
    /// All sessions of a user ordered by `order`.
    async fn get_user_sessions(&self, user_id: &str) -> StorageResult<Vec<Session>>;
    /// Overwrite the mutable fields of a session if its version is unchanged.
    ///
    /// On success the stored version is `session.version + 1`.
    async fn update_session(&self, session: &Session) -> StorageResult<()>;
}
