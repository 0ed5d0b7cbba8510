//! Unit tests for storage record types.
//!
//! Covers transcript helpers on [`Session`], stage ordering and the JSON
//! shape of transcript entries and extracted symptoms.

use super::*;
use serde_json::json;

fn transcript() -> Session {
    let mut session = Session::new("user-1", "doctor-1", 1, "ar");
    session.push_message(Sender::AiBase, "Q1", 1);
    session.push_message(Sender::User, "A1", 1);
    session.push_message(Sender::Ai, "Tell me more", 1);
    session.push_message(Sender::User, "A1b", 1);
    session.push_message(Sender::AiBase, "Q2", 2);
    session.push_message(Sender::User, "A2", 2);
    session.push_message(Sender::AiBase, "Q3", 3);
    session
}

#[test]
fn test_session_new_defaults() {
    let session = Session::new("user-1", "doctor-1", 3, "A");
    assert_eq!(session.order, 3);
    assert_eq!(session.type_ques, "A");
    assert_eq!(session.stage, Stage::Screening);
    assert_eq!(session.current_disorder, UNCLASSIFIED);
    assert_eq!(session.progress, 0.0);
    assert_eq!(session.version, 0);
    assert!(!session.finished);
    assert!(session.end_date.is_none());
    assert!(session.messages.is_empty());
}

#[test]
fn test_question_count_counts_ai_base_only() {
    assert_eq!(transcript().question_count(), 3);
}

#[test]
fn test_user_answer_filters() {
    let session = transcript();
    assert_eq!(session.user_answers(), vec!["A1", "A1b", "A2"]);
    assert_eq!(session.answers_after(1), vec!["A2"]);
    assert_eq!(session.answers_through(1), vec!["A1", "A1b"]);
}

#[test]
fn test_advance_to_never_goes_back() {
    let mut session = Session::new("u", "d", 1, "ar");
    session.advance_to(Stage::DisorderDepth);
    session.advance_to(Stage::DisorderFocus);
    assert_eq!(session.stage, Stage::DisorderDepth);
}

#[test]
fn test_finish_snaps_progress() {
    let mut session = Session::new("u", "d", 1, "ar");
    session.progress = 42.5;
    session.finish();
    assert!(session.finished);
    assert_eq!(session.progress, 100.0);
    assert!(session.end_date.is_some());
}

#[test]
fn test_stage_numbers_round_trip() {
    for n in 1..=4u8 {
        let stage = Stage::try_from(n).unwrap();
        assert_eq!(stage.number(), n);
    }
    assert!(Stage::try_from(0).is_err());
    assert!(Stage::try_from(5).is_err());
    assert!(Stage::Screening < Stage::SymptomConfirmation);
}

#[test]
fn test_stage_serializes_as_number() {
    assert_eq!(serde_json::to_value(Stage::DisorderDepth).unwrap(), json!(3));
    let stage: Stage = serde_json::from_value(json!(4)).unwrap();
    assert_eq!(stage, Stage::SymptomConfirmation);
    assert!(serde_json::from_value::<Stage>(json!(9)).is_err());
}

#[test]
fn test_message_wire_shape() {
    let mut session = Session::new("u", "d", 1, "ar");
    session.push_message(Sender::AiBase, "Hello", 1);
    let value = serde_json::to_value(&session.messages[0]).unwrap();
    assert_eq!(value["sender"], "ai-base");
    assert_eq!(value["content"], "Hello");
    assert_eq!(value["idQue"], 1);
    assert!(value["timestamp"].is_string());
}

#[test]
fn test_extracted_symptom_wire_shape() {
    let symptom = ExtractedSymptom {
        name: "fatigue".to_string(),
        label: 7,
        selected: UNSELECTED,
        association: 0.0,
        association_by_ai: 0.64,
    };
    let value = serde_json::to_value(&symptom).unwrap();
    assert_eq!(
        value,
        json!({
            "name": "fatigue",
            "label": 7,
            "selected": -1,
            "association": 0.0,
            "associationByAI": 0.64
        })
    );
}

#[test]
fn test_sender_display() {
    assert_eq!(Sender::User.to_string(), "user");
    assert_eq!(Sender::Ai.to_string(), "ai");
    assert_eq!(Sender::AiBase.to_string(), "ai-base");
}

#[test]
fn test_doctor_builder() {
    let doctor = Doctor::new("Dr. Salma", "female", "salma@example.com", "salma")
        .with_description("Psychiatrist");
    assert_eq!(doctor.description.as_deref(), Some("Psychiatrist"));
}
