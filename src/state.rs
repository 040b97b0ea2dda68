use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::config::Config;
use crate::utils::confirmation::ConfirmationCodes;
use crate::utils::mailer::{self, Mailer};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// State with the mail backend chosen by `config`.
    pub fn new(pool: PgPool, config: Config) -> Self {
        let mailer = mailer::from_config(&config);
        Self { pool, config, mailer }
    }

    pub fn confirmation_codes(&self) -> ConfirmationCodes {
        ConfirmationCodes::new(
            &self.config.confirmation_secret,
            self.config.confirmation_code_ttl,
        )
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
