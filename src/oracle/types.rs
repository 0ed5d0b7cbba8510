use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Envelope wrapping every oracle response.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleEnvelope<T> {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

/// What the oracle wants to do next with the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// The question bank is exhausted for this path.
    Unknown,
    /// Closing remark; the next real question must be fetched separately.
    Sentence,
    /// A new diagnostic question (advances the question index).
    Question,
    /// Follow-up within the current question.
    Sequential,
}

impl QuestionKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Unknown => "unknown",
            QuestionKind::Sentence => "sentence",
            QuestionKind::Question => "question",
            QuestionKind::Sequential => "sequential",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a question generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default, alias = "question", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl GeneratedQuestion {
    /// A reply carrying text.
    pub fn new(kind: QuestionKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: Some(text.into()),
        }
    }

    /// The "no more questions" reply.
    pub fn unknown() -> Self {
        Self {
            kind: QuestionKind::Unknown,
            text: None,
        }
    }
}

/// Request body for question generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateQuestionRequest<'a> {
    #[serde(rename = "userRes")]
    pub user_res: &'a str,
}

/// Request body for classification and extraction.
#[derive(Debug, Clone, Serialize)]
pub struct AnswersRequest<'a> {
    #[serde(rename = "userAns")]
    pub user_ans: &'a [String],
}

/// Symptom candidate proposed by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomCandidate {
    pub name: String,
    pub label: i64,
    pub probability: f64,
}

/// Stage size tables, keyed by disorder label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageLimits {
    pub first_stage_limit: u32,
    #[serde(default)]
    pub second_stage_limit: BTreeMap<i64, u32>,
    #[serde(default)]
    pub third_stage_limit: BTreeMap<i64, u32>,
}

impl StageLimits {
    /// Create limits with only a first stage size
    pub fn new(first_stage_limit: u32) -> Self {
        Self {
            first_stage_limit,
            second_stage_limit: BTreeMap::new(),
            third_stage_limit: BTreeMap::new(),
        }
    }

    /// Add the second and third stage sizes for a disorder label
    pub fn with_disorder(mut self, label: i64, second: u32, third: u32) -> Self {
        self.second_stage_limit.insert(label, second);
        self.third_stage_limit.insert(label, third);
        self
    }
}
