use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use super::machine::{Association, SessionMachine};
use crate::error::{AppError, AppResult, SessionError};
use crate::oracle::Oracle;
use crate::storage::{ExtractedSymptom, Message, Session, Stage, Storage};

/// Input for creating a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Doctor the session is opened with.
    pub doctor_id: String,
    /// Question-set variant; the configured default when absent.
    #[serde(default)]
    pub type_ques: Option<String>,
}

/// Result of creating a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    /// New session id.
    pub session_id: String,
}

/// State after an answered turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    /// Current stage.
    pub stage: Stage,
    /// Progress in [0, 100].
    pub progress: f64,
    /// Terminal flag.
    pub finished: bool,
    /// Full transcript.
    pub messages: Vec<Message>,
    /// Symptoms awaiting confirmation.
    pub extracted_symptoms: Vec<ExtractedSymptom>,
    /// Latest disorder label.
    pub current_disorder: i64,
}

/// Result of confirming associations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationView {
    /// Always true on success.
    pub finished: bool,
}

/// Full session record as returned to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Doctor the session was opened with.
    pub doctor_id: String,
    /// Position among the user's sessions.
    pub order: i64,
    /// Question-set variant.
    pub type_ques: String,
    /// Current stage.
    pub stage: Stage,
    /// Progress in [0, 100].
    pub progress: f64,
    /// Whether the next oracle call carries the last answer.
    pub next_for_id_que: bool,
    /// Latest disorder label.
    pub current_disorder: i64,
    /// Terminal flag.
    pub finished: bool,
    /// Symptoms surfaced in stage 4.
    pub extracted_symptoms: Vec<ExtractedSymptom>,
    /// Full transcript.
    pub messages: Vec<Message>,
    /// Creation time.
    pub start_date: DateTime<Utc>,
    /// Finishing time.
    pub end_date: Option<DateTime<Utc>>,
}

/// One line of the user's session history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Position among the user's sessions.
    pub order: i64,
    /// Display name of the doctor.
    pub doctor_name: String,
    /// Terminal flag.
    pub finished: bool,
    /// Current stage.
    pub stage: Stage,
    /// Progress in [0, 100].
    pub progress: f64,
    /// Creation time.
    pub creation_date: DateTime<Utc>,
    /// Finishing time.
    pub finishing_date: Option<DateTime<Utc>>,
}

impl From<&Session> for TurnView {
    fn from(session: &Session) -> Self {
        Self {
            stage: session.stage,
            progress: session.progress,
            finished: session.finished,
            messages: session.messages.clone(),
            extracted_symptoms: session.extracted_symptoms.clone(),
            current_disorder: session.current_disorder,
        }
    }
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            doctor_id: session.doctor_id,
            order: session.order,
            type_ques: session.type_ques,
            stage: session.stage,
            progress: session.progress,
            next_for_id_que: session.next_for_id_que,
            current_disorder: session.current_disorder,
            finished: session.finished,
            extracted_symptoms: session.extracted_symptoms,
            messages: session.messages,
            start_date: session.start_date,
            end_date: session.end_date,
        }
    }
}

/// Keyed async mutexes; entries nobody holds or waits on are dropped on the
/// next acquisition.
#[derive(Default)]
struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockRegistry {
    async fn acquire(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Session operations on behalf of an authenticated user.
///
/// Every read-modify-write of a session runs under that session's lock and
/// ends with a version-checked write, so concurrent turns never interleave.
pub struct SessionService {
    storage: Arc<dyn Storage>,
    oracle: Arc<dyn Oracle>,
    default_question_set: String,
    locks: LockRegistry,
}

impl SessionService {
    /// Create a service over `storage` and `oracle`.
    pub fn new(
        storage: Arc<dyn Storage>,
        oracle: Arc<dyn Oracle>,
        default_question_set: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            oracle,
            default_question_set: default_question_set.into(),
            locks: LockRegistry::default(),
        }
    }

    /// Open a new session with a doctor and ask its first question.
    pub async fn create_session(
        &self,
        user_id: &str,
        request: CreateSessionRequest,
    ) -> AppResult<CreatedSession> {
        let doctor_id = request.doctor_id.trim();
        if doctor_id.is_empty() {
            return Err(AppError::validation("doctorId", "is required"));
        }
        let type_ques = match request.type_ques.as_deref().map(str::trim) {
            Some("") => return Err(AppError::validation("typeQues", "cannot be empty")),
            Some(set) => set.to_string(),
            None => self.default_question_set.clone(),
        };

        let _guard = self.locks.acquire(format!("user:{}", user_id)).await;

        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| not_found("User", user_id))?;
        self.storage
            .get_doctor(doctor_id)
            .await?
            .ok_or_else(|| not_found("Doctor", doctor_id))?;

        let existing = self.storage.get_user_sessions(user_id).await?;
        if existing.iter().any(|s| !s.finished) {
            warn!(user_id = %user_id, "Rejected second open session");
            return Err(SessionError::OpenSessionExists {
                user_id: user_id.to_string(),
            }
            .into());
        }

        let order = existing.len() as i64 + 1;
        let mut session = Session::new(user_id, doctor_id, order, type_ques);
        SessionMachine::new(self.oracle.as_ref())
            .open(&mut session, &user.username)
            .await?;
        self.storage.create_session(&session).await?;

        info!(
            session_id = %session.id,
            user_id = %user_id,
            doctor_id = %doctor_id,
            order,
            type_ques = %session.type_ques,
            "Session created"
        );

        Ok(CreatedSession {
            session_id: session.id,
        })
    }

    /// Record the user's answer and advance the session.
    pub async fn add_message(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> AppResult<TurnView> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::validation("message", "cannot be empty"));
        }

        let _guard = self.locks.acquire(format!("session:{}", session_id)).await;
        let mut session = self.load_owned(user_id, session_id).await?;

        let outcome = SessionMachine::new(self.oracle.as_ref())
            .answer(&mut session, message)
            .await?;
        self.persist(&mut session).await?;

        info!(
            session_id = %session_id,
            user_id = %user_id,
            kind = %outcome.kind,
            stage_before = %outcome.stage_before,
            stage_after = %outcome.stage_after,
            progress = session.progress,
            finished = outcome.finished,
            "Turn recorded"
        );

        Ok(TurnView::from(&session))
    }

    /// Apply confirmed symptom associations and finish the session.
    pub async fn confirm_associations(
        &self,
        user_id: &str,
        session_id: &str,
        associations: &[Association],
    ) -> AppResult<ConfirmationView> {
        let _guard = self.locks.acquire(format!("session:{}", session_id)).await;
        let mut session = self.load_owned(user_id, session_id).await?;

        SessionMachine::new(self.oracle.as_ref())
            .confirm_associations(&mut session, associations)?;
        self.persist(&mut session).await?;

        Ok(ConfirmationView {
            finished: session.finished,
        })
    }

    /// Read a session owned by the caller.
    pub async fn get_session(&self, user_id: &str, session_id: &str) -> AppResult<SessionView> {
        let session = self.load_owned(user_id, session_id).await?;
        Ok(session.into())
    }

    /// The caller's sessions in creation order, with doctor names.
    pub async fn list_sessions(&self, user_id: &str) -> AppResult<Vec<SessionSummary>> {
        let sessions = self.storage.get_user_sessions(user_id).await?;

        let doctors = try_join_all(
            sessions
                .iter()
                .map(|s| self.storage.get_doctor(&s.doctor_id)),
        )
        .await?;

        let summaries = sessions
            .into_iter()
            .zip(doctors)
            .map(|(session, doctor)| {
                let doctor_name = match doctor {
                    Some(doctor) => doctor.name,
                    None => {
                        warn!(
                            session_id = %session.id,
                            doctor_id = %session.doctor_id,
                            "Session references a missing doctor"
                        );
                        String::new()
                    }
                };
                SessionSummary {
                    order: session.order,
                    doctor_name,
                    finished: session.finished,
                    stage: session.stage,
                    progress: session.progress,
                    creation_date: session.start_date,
                    finishing_date: session.end_date,
                }
            })
            .collect();

        Ok(summaries)
    }

    async fn load_owned(&self, user_id: &str, session_id: &str) -> AppResult<Session> {
        let session = self
            .storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| not_found("Session", session_id))?;

        if session.user_id != user_id {
            warn!(session_id = %session_id, user_id = %user_id, "Session ownership mismatch");
            return Err(SessionError::Forbidden {
                session_id: session_id.to_string(),
            }
            .into());
        }

        Ok(session)
    }

    async fn persist(&self, session: &mut Session) -> AppResult<()> {
        self.storage.update_session(session).await?;
        session.version += 1;
        Ok(())
    }
}

fn not_found(entity: &'static str, id: &str) -> AppError {
    SessionError::NotFound {
        entity,
        id: id.to_string(),
    }
    .into()
}
