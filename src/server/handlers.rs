use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::SharedState;
use crate::error::{AppResult, RpcError};
use crate::session::{Association, CreateSessionRequest};

/// Session methods served over JSON-RPC.
pub const SESSION_METHODS: &[&str] = &[
    "sessions/create",
    "sessions/add_message",
    "sessions/confirm_associations",
    "sessions/get",
    "sessions/list",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    #[serde(default)]
    authorization: String,
    #[serde(flatten)]
    request: CreateSessionRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMessageParams {
    #[serde(default)]
    authorization: String,
    session_id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmParams {
    #[serde(default)]
    authorization: String,
    session_id: String,
    associations: Vec<Association>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionParams {
    #[serde(default)]
    authorization: String,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    authorization: String,
}

/// Route a session method to its handler.
pub async fn handle_method(
    state: &SharedState,
    method: &str,
    params: Option<Value>,
) -> AppResult<Value> {
    info!(method = %method, "Routing method call");

    match method {
        "sessions/create" => handle_create(state, params).await,
        "sessions/add_message" => handle_add_message(state, params).await,
        "sessions/confirm_associations" => handle_confirm(state, params).await,
        "sessions/get" => handle_get(state, params).await,
        "sessions/list" => handle_list(state, params).await,
        _ => Err(RpcError::UnknownMethod {
            method: method.to_string(),
        }
        .into()),
    }
}

async fn handle_create(state: &SharedState, params: Option<Value>) -> AppResult<Value> {
    let params: CreateParams = parse_arguments("sessions/create", params)?;
    let user_id = authenticate(state, &params.authorization).await?;
    let created = state.sessions.create_session(&user_id, params.request).await?;
    to_value(created)
}

async fn handle_add_message(state: &SharedState, params: Option<Value>) -> AppResult<Value> {
    let params: AddMessageParams = parse_arguments("sessions/add_message", params)?;
    let user_id = authenticate(state, &params.authorization).await?;
    let view = state
        .sessions
        .add_message(&user_id, &params.session_id, &params.message)
        .await?;
    to_value(view)
}

async fn handle_confirm(state: &SharedState, params: Option<Value>) -> AppResult<Value> {
    let params: ConfirmParams = parse_arguments("sessions/confirm_associations", params)?;
    let user_id = authenticate(state, &params.authorization).await?;
    let view = state
        .sessions
        .confirm_associations(&user_id, &params.session_id, &params.associations)
        .await?;
    to_value(view)
}

async fn handle_get(state: &SharedState, params: Option<Value>) -> AppResult<Value> {
    let params: SessionParams = parse_arguments("sessions/get", params)?;
    let user_id = authenticate(state, &params.authorization).await?;
    let view = state.sessions.get_session(&user_id, &params.session_id).await?;
    to_value(view)
}

async fn handle_list(state: &SharedState, params: Option<Value>) -> AppResult<Value> {
    let params: ListParams = parse_arguments("sessions/list", params)?;
    let user_id = authenticate(state, &params.authorization).await?;
    let sessions = state.sessions.list_sessions(&user_id).await?;
    to_value(sessions)
}

async fn authenticate(state: &SharedState, credential: &str) -> AppResult<String> {
    state.verifier.verify(credential).await.map_err(|e| {
        warn!(error = %e, "Credential rejected");
        e.into()
    })
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    method: &str,
    params: Option<Value>,
) -> AppResult<T> {
    match params {
        Some(params) => serde_json::from_value(params).map_err(|e| {
            RpcError::InvalidParameters {
                method: method.to_string(),
                message: e.to_string(),
            }
            .into()
        }),
        None => Err(RpcError::InvalidParameters {
            method: method.to_string(),
            message: "Missing params".to_string(),
        }
        .into()),
    }
}

fn to_value<T: Serialize>(value: T) -> AppResult<Value> {
    Ok(serde_json::to_value(value).map_err(RpcError::Json)?)
}
