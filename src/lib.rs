pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use sqlx::PgPool;

use crate::database::postgres::PgStore;
use crate::middleware::auth::AuthKeys;
use crate::models::assessment::AssessmentKind;
use crate::services::session_service::{SessionService, SessionSettings};
use crate::utils::time::SystemClock;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionService,
    pub auth: AuthKeys,
    pub public_rps: u32,
}

impl AppState {
    /// Production wiring: PostgreSQL for attempts, assessments and paid-exam
    /// grants; weekly assessments stay free.
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let store = Arc::new(PgStore::new(pool));
        let sessions = SessionService::new(
            store.clone(),
            store.clone(),
            Arc::new(SystemClock),
            SessionSettings::from(config),
        )
        .with_entitlement(AssessmentKind::RmExam, store);

        Self {
            sessions,
            auth: AuthKeys::new(&config.jwt_secret),
            public_rps: config.public_rps,
        }
    }

    pub fn with_sessions(sessions: SessionService, auth: AuthKeys, public_rps: u32) -> Self {
        Self {
            sessions,
            auth,
            public_rps,
        }
    }
}
