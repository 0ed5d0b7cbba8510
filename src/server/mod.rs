//! JSON-RPC server over stdio.
//!
//! This module provides:
//! - The line-delimited JSON-RPC 2.0 loop ([`RpcServer`])
//! - Method routing and credential checks ([`handle_method`])
//! - Shared application state

mod handlers;
mod rpc;

pub use handlers::*;
pub use rpc::*;

use std::sync::Arc;

use crate::auth::{CredentialVerifier, JwtVerifier};
use crate::config::Config;
use crate::oracle::Oracle;
use crate::session::SessionService;
use crate::storage::Storage;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Resolves caller credentials to user ids.
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Session operations.
    pub sessions: SessionService,
}

impl AppState {
    /// Wire the session service and JWT verifier from `config`.
    pub fn new(config: Config, storage: Arc<dyn Storage>, oracle: Arc<dyn Oracle>) -> Self {
        let verifier = Arc::new(JwtVerifier::new(&config.auth));
        Self::with_verifier(config, storage, oracle, verifier)
    }

    /// Like [`AppState::new`] with a custom credential verifier.
    pub fn with_verifier(
        config: Config,
        storage: Arc<dyn Storage>,
        oracle: Arc<dyn Oracle>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        tracing::info!(
            oracle_url = %config.oracle.base_url,
            question_set = %config.oracle.default_question_set,
            "AppState initializing"
        );

        let sessions = SessionService::new(
            storage,
            oracle,
            config.oracle.default_question_set.clone(),
        );

        Self {
            config,
            verifier,
            sessions,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
