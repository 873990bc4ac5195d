// API module - HTTP endpoints

pub mod cards;
pub mod health;
pub mod middleware;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::{broker::Broker, mailer::Mailer};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub broker: Arc<dyn Broker>,
    pub mailer: Arc<dyn Mailer>,
}
