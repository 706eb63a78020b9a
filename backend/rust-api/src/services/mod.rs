use std::sync::Arc;

use crate::config::Config;
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use catalog_service::{MongoQuestionCatalog, QuestionCatalog};
use feedback_service::{FeedbackGenerator, HttpFeedbackClient};
use log_service::{MongoQuestionLogStore, QuestionLogStore};
use session_store::{RedisSessionStore, SessionStore};

pub struct AppState {
    pub config: Config,
    pub catalog: Arc<dyn QuestionCatalog>,
    pub sessions: Arc<dyn SessionStore>,
    pub logs: Arc<dyn QuestionLogStore>,
    pub feedback: Arc<dyn FeedbackGenerator>,
}

impl AppState {
    /// Wire the production backends: MongoDB for the catalog and the log
    /// store, Redis for session state, HTTP for the feedback service.
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        // Create ConnectionManager with longer timeout
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        // Test connection
        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let catalog = Arc::new(MongoQuestionCatalog::new(mongo.clone()));
        let sessions = Arc::new(RedisSessionStore::new(redis, config.session_ttl_seconds));
        let logs = Arc::new(MongoQuestionLogStore::new(mongo));
        let feedback = Arc::new(HttpFeedbackClient::new(config.feedback_api_url.clone()));

        Ok(Self::with_backends(config, catalog, sessions, logs, feedback))
    }

    /// Assemble state from explicit backends. Tests use this with the
    /// in-memory implementations.
    pub fn with_backends(
        config: Config,
        catalog: Arc<dyn QuestionCatalog>,
        sessions: Arc<dyn SessionStore>,
        logs: Arc<dyn QuestionLogStore>,
        feedback: Arc<dyn FeedbackGenerator>,
    ) -> Self {
        Self {
            config,
            catalog,
            sessions,
            logs,
            feedback,
        }
    }
}

pub mod catalog_service;
pub mod feedback_service;
pub mod log_service;
pub mod quiz_service;
pub mod scoring_service;
pub mod session_store;
