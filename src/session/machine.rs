//! The diagnostic session state machine.
//!
//! A session moves through four stages:
//!
//! - **Screening** (1): generic questions until the first stage limit
//! - **DisorderFocus** (2) and **DisorderDepth** (3): disorder-specific questions
//! - **SymptomConfirmation** (4): candidate symptoms wait for the user
//!
//! and finishes either on a "no disorder" first-stage classification or when
//! the user confirms symptom associations. Every turn works on a copy of the
//! session; the caller's session is only replaced when all oracle calls of the
//! turn succeeded.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::progress::{self, disorder_key, StageBudget};
use crate::error::{AppError, AppResult, OracleError, OracleResult};
use crate::oracle::{GeneratedQuestion, Oracle, QuestionKind, StageLimits};
use crate::storage::{ExtractedSymptom, Sender, Session, Stage, UNSELECTED};

/// Stage key used for the opening question.
pub const FIRST_QUESTION_KEY: &str = "1";

/// Placeholder in the opening question replaced by the user's display name.
const NAME_PLACEHOLDER: char = '_';

/// A user-confirmed association for one extracted symptom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    /// Label of the extracted symptom.
    pub label: i64,
    /// Confirmed association value.
    pub association: f64,
}

/// Summary of one answered turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnOutcome {
    /// Kind of the oracle's reply.
    pub kind: QuestionKind,
    /// Stage before the turn.
    pub stage_before: Stage,
    /// Stage after the turn.
    pub stage_after: Stage,
    /// Whether the turn finished the session.
    pub finished: bool,
}

/// Drives sessions through their stages using an [`Oracle`].
pub struct SessionMachine<'a> {
    oracle: &'a dyn Oracle,
}

impl<'a> SessionMachine<'a> {
    /// Create a machine backed by `oracle`.
    pub fn new(oracle: &'a dyn Oracle) -> Self {
        Self { oracle }
    }

    /// Ask the opening question of a fresh session.
    ///
    /// The first `_` in the oracle's text is replaced by ` {display_name} `.
    pub async fn open(&self, session: &mut Session, display_name: &str) -> AppResult<()> {
        if !session.messages.is_empty() {
            return Err(AppError::inconsistent(format!(
                "session {} has already been opened",
                session.id
            )));
        }

        let mut draft = session.clone();
        let limits = self.oracle.stage_limits().await?;
        let first = self
            .oracle
            .generate_question(1, "", FIRST_QUESTION_KEY, &draft.type_ques)
            .await?;
        if first.kind == QuestionKind::Unknown {
            return Err(OracleError::InvalidResponse {
                message: format!("no opening question for question set {}", draft.type_ques),
            }
            .into());
        }

        let text = reply_text(&first)?;
        draft.push_message(Sender::AiBase, personalize(&text, display_name), 1);
        draft.next_for_id_que = true;
        draft.progress = progress::compute(&draft, &limits)?;

        debug!(session_id = %draft.id, progress = draft.progress, "Session opened");
        *session = draft;
        Ok(())
    }

    /// Record `answer` and advance the conversation.
    pub async fn answer(&self, session: &mut Session, answer: &str) -> AppResult<TurnOutcome> {
        ensure_accepts_answers(session)?;

        let mut draft = session.clone();
        let stage_before = draft.stage;
        let limits = self.oracle.stage_limits().await?;

        let asked = draft.question_count();
        draft.push_message(Sender::User, answer, asked);

        // Re-classified every turn: the latest label selects the stage tables below.
        draft.current_disorder = self
            .oracle
            .classify_first_stage(&draft.user_answers())
            .await?;
        let budget = StageBudget::resolve(&limits, draft.current_disorder)?;
        let key = disorder_key(draft.current_disorder).to_string();

        let prior = if draft.next_for_id_que { answer } else { "" };
        let next = self
            .oracle
            .generate_question(asked + 1, prior, &key, &draft.type_ques)
            .await?;

        debug!(
            session_id = %draft.id,
            asked,
            kind = %next.kind,
            disorder = draft.current_disorder,
            "Oracle replied"
        );

        match next.kind {
            QuestionKind::Unknown => {
                self.enter_symptom_confirmation(&mut draft, &limits).await?;
            }
            QuestionKind::Sentence => {
                draft.push_message(Sender::Ai, reply_text(&next)?, asked);
                let index = asked + 1;
                if index <= budget.third {
                    let follow_up = self
                        .oracle
                        .generate_question(index, "", &key, &draft.type_ques)
                        .await?;
                    if follow_up.kind == QuestionKind::Unknown {
                        self.enter_symptom_confirmation(&mut draft, &limits).await?;
                    } else {
                        draft.push_message(Sender::AiBase, reply_text(&follow_up)?, index);
                    }
                }
                draft.next_for_id_que = true;
            }
            QuestionKind::Question => {
                draft.push_message(Sender::AiBase, reply_text(&next)?, asked + 1);
                draft.next_for_id_que = true;
            }
            QuestionKind::Sequential => {
                draft.push_message(Sender::Ai, reply_text(&next)?, asked);
                draft.next_for_id_que = false;
            }
        }

        // Follow-ups stay inside the current question and never cross a boundary.
        if next.kind != QuestionKind::Sequential && draft.stage < Stage::SymptomConfirmation {
            self.cross_stage_boundary(&mut draft, asked, &limits).await?;
        }

        if !draft.finished {
            draft.progress = progress::compute(&draft, &limits)?;
        }

        let outcome = TurnOutcome {
            kind: next.kind,
            stage_before,
            stage_after: draft.stage,
            finished: draft.finished,
        };
        *session = draft;
        Ok(outcome)
    }

    /// Apply user-confirmed associations and finish the session.
    ///
    /// Every label must match an extracted symptom; otherwise nothing changes.
    pub fn confirm_associations(
        &self,
        session: &mut Session,
        associations: &[Association],
    ) -> AppResult<()> {
        if session.finished {
            return Err(AppError::inconsistent(format!(
                "session {} is already finished",
                session.id
            )));
        }
        if session.stage != Stage::SymptomConfirmation {
            return Err(AppError::inconsistent(format!(
                "session {} has no symptoms awaiting confirmation (stage {})",
                session.id, session.stage
            )));
        }
        if associations.is_empty() {
            return Err(AppError::validation(
                "associations",
                "at least one association is required",
            ));
        }

        let mut targets = Vec::with_capacity(associations.len());
        for item in associations {
            let index = session
                .extracted_symptoms
                .iter()
                .position(|s| s.label == item.label)
                .ok_or_else(|| {
                    AppError::inconsistent(format!(
                        "label {} matches no extracted symptom",
                        item.label
                    ))
                })?;
            targets.push((index, item.association));
        }

        for (index, association) in targets {
            session.extracted_symptoms[index].association = association;
        }
        session.finish();

        info!(
            session_id = %session.id,
            confirmed = associations.len(),
            "Symptom associations confirmed"
        );
        Ok(())
    }

    /// Evaluate stage boundaries after question `closed` was answered.
    async fn cross_stage_boundary(
        &self,
        draft: &mut Session,
        closed: u32,
        limits: &StageLimits,
    ) -> AppResult<()> {
        let budget = StageBudget::resolve(limits, draft.current_disorder)?;

        match draft.stage {
            Stage::Screening if closed >= budget.first => {
                let label = self
                    .oracle
                    .classify_first_stage(&draft.answers_through(budget.first))
                    .await?;
                draft.current_disorder = label;
                if label == 0 {
                    draft.finish();
                    info!(session_id = %draft.id, "No disorder detected, session finished");
                } else {
                    draft.advance_to(Stage::DisorderFocus);
                    info!(session_id = %draft.id, disorder = label, "Screening complete");
                }
            }
            Stage::DisorderFocus if closed >= budget.second => {
                draft.advance_to(Stage::DisorderDepth);
                info!(session_id = %draft.id, "Entered stage 3");
            }
            Stage::DisorderDepth if closed >= budget.third => {
                self.enter_symptom_confirmation(draft, limits).await?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Move to stage 4 and populate the extracted symptoms, once.
    async fn enter_symptom_confirmation(
        &self,
        draft: &mut Session,
        limits: &StageLimits,
    ) -> OracleResult<()> {
        if draft.stage == Stage::SymptomConfirmation {
            return Ok(());
        }

        let answers = draft.answers_after(limits.first_stage_limit);
        let disorder = disorder_key(draft.current_disorder);
        let candidates = self.oracle.extract_symptoms(&answers, disorder).await?;

        draft.extracted_symptoms = candidates
            .into_iter()
            .map(|c| ExtractedSymptom {
                name: c.name,
                label: c.label,
                selected: UNSELECTED,
                association: 0.0,
                association_by_ai: c.probability,
            })
            .collect();
        draft.stage = Stage::SymptomConfirmation;

        info!(
            session_id = %draft.id,
            symptoms = draft.extracted_symptoms.len(),
            "Entered symptom confirmation"
        );
        Ok(())
    }
}

fn ensure_accepts_answers(session: &Session) -> AppResult<()> {
    if session.finished {
        return Err(AppError::inconsistent(format!(
            "session {} is already finished",
            session.id
        )));
    }
    if session.stage == Stage::SymptomConfirmation {
        return Err(AppError::inconsistent(format!(
            "session {} is awaiting symptom confirmation",
            session.id
        )));
    }
    if session.question_count() == 0 {
        return Err(AppError::inconsistent(format!(
            "session {} has no open question",
            session.id
        )));
    }
    Ok(())
}

fn reply_text(reply: &GeneratedQuestion) -> OracleResult<String> {
    match reply.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(OracleError::InvalidResponse {
            message: format!("{} reply has no text", reply.kind),
        }),
    }
}

/// Insert the user's display name at the first placeholder.
pub fn personalize(text: &str, display_name: &str) -> String {
    text.replacen(NAME_PLACEHOLDER, &format!(" {} ", display_name), 1)
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod machine_tests;
