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

use crate::config::Config;
use crate::database::{postgres::PgStore, Store};
use crate::services::{
    matching_service::MatchingService, notification_service::NotificationService,
    pipeline_service::PipelineService, session_service::SessionService,
};
use crate::utils::time::{Clock, SystemClock};
use sqlx::PgPool;

/// The slice of configuration the request handlers and services need.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub notification_webhook_url: Option<String>,
    pub assessment_duration_seconds: i64,
}

impl From<&Config> for AppSettings {
    fn from(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
            notification_webhook_url: config.notification_webhook_url.clone(),
            assessment_duration_seconds: config.assessment_duration_seconds,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline_service: PipelineService,
    pub session_service: SessionService,
    pub matching_service: MatchingService,
    pub notification_service: NotificationService,
    pub jwt_secret: Arc<String>,
    pub assessment_duration_seconds: i64,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self::with_store(
            Arc::new(PgStore::new(pool)),
            Arc::new(SystemClock),
            AppSettings::from(config),
        )
    }

    /// Wires every service against one store and one clock.
    pub fn with_store<S: Store + 'static>(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        settings: AppSettings,
    ) -> Self {
        let notification_service = NotificationService::new(
            store.clone(),
            clock.clone(),
            settings.notification_webhook_url,
            settings.webhook_secret,
        );
        let pipeline_service = PipelineService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notification_service.clone(),
            clock.clone(),
        );
        let session_service = SessionService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            pipeline_service.clone(),
            clock,
        );
        let matching_service = MatchingService::new(store.clone(), store);

        Self {
            pipeline_service,
            session_service,
            matching_service,
            notification_service,
            jwt_secret: Arc::new(settings.jwt_secret),
            assessment_duration_seconds: settings.assessment_duration_seconds,
        }
    }
}
