//! # Guided Diagnosis Session Server
//!
//! A backend for staged diagnostic conversations. A patient opens a session
//! with a doctor profile and answers questions produced by an external
//! question oracle; the session state machine tracks the transcript, decides
//! stage transitions, derives progress and finally surfaces candidate symptoms
//! for the patient to confirm.
//!
//! ## Stages
//!
//! 1. **Screening**: generic questions, then a first-stage classification
//!    (label `0` finishes the session)
//! 2. **Disorder focus** and 3. **disorder depth**: disorder-specific questions
//! 4. **Symptom confirmation**: extracted symptoms wait for the patient
//!
//! ## Architecture
//!
//! ```text
//! JSON-RPC client → RpcServer (stdio) → SessionService → SessionMachine → Oracle (HTTP)
//!                                             ↓
//!                                       SQLite (sessions)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use guided_diagnosis::{AppState, Config, RpcServer};
//! use guided_diagnosis::oracle::OracleClient;
//! use guided_diagnosis::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let oracle = OracleClient::new(&config.oracle, config.request.clone())?;
//!     let state = Arc::new(AppState::new(config, Arc::new(storage), Arc::new(oracle)));
//!     RpcServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Caller credential verification.
pub mod auth;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Question oracle contract and HTTP client.
pub mod oracle;
/// JSON-RPC server and request handling.
pub mod server;
/// Session state machine and orchestration.
pub mod session;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use server::{AppState, RpcServer, SharedState};
pub use session::{SessionMachine, SessionService};
