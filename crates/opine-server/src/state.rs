//! Shared application state.
//!
//! Adapters are constructed once at startup and passed into every request
//! scope through this context; there are no process-global singletons.

use std::sync::Arc;

use opine_analytics::AnalyticsEngine;
use opine_auth::TokenService;
use opine_cache::{Cache, MemoryCache, RedisCache};
use opine_core::AppConfig;
use opine_db::admin::AdminMutator;
use opine_db::analytics::AnalyticsStore;
use opine_db::annotations::AnnotationRepo;
use opine_db::audit::AuditRepo;
use opine_db::batches::BatchRepo;
use opine_db::conversations::ConversationRepo;
use opine_db::feedback::FeedbackRepo;
use opine_db::topics::TopicRepo;
use opine_db::Pool;
use opine_error::Result;
use opine_ingest::IngestPipeline;
use opine_qa::{HttpLlmClient, LiveToolbox, QaAgent};
use opine_queue::{JobQueue, MemoryJobQueue, RedisJobQueue};
use opine_vector::{HttpVectorIndex, MemoryVectorIndex, VectorIndex};
use opine_workers::{EnrichmentModel, HttpModel, LexiconModel, StageContext};
use tracing::info;

use crate::middleware::rate_limit::RateLimiter;

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Connection pool (health checks, exports, matview refresh).
    pub pool: Pool,
    /// Ingestion pipeline.
    pub ingest: IngestPipeline,
    /// Cache-through rollup engine.
    pub analytics: AnalyticsEngine,
    /// Read-only statement surface (admin topic/feedback pages).
    pub store: AnalyticsStore,
    /// Feedback repository.
    pub feedback: FeedbackRepo,
    /// Annotation repository (admin stats).
    pub annotations: AnnotationRepo,
    /// Topic repository.
    pub topics: TopicRepo,
    /// Audit read surface.
    pub audit: AuditRepo,
    /// Batch repository.
    pub batches: BatchRepo,
    /// QA conversation history.
    pub conversations: ConversationRepo,
    /// Transactional admin mutations.
    pub admin: AdminMutator,
    /// TTL cache adapter.
    pub cache: Arc<dyn Cache>,
    /// Job queue adapter.
    pub queue: Arc<dyn JobQueue>,
    /// Token signer/verifier.
    pub tokens: Arc<TokenService>,
    /// Grounded QA facade.
    pub qa: Arc<QaAgent>,
    /// Process-local rate limiter.
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Build the state from configuration: connect the pool, bootstrap the
    /// schema, and pick concrete backends for cache/queue/vector/model.
    ///
    /// # Errors
    ///
    /// Returns connection or bootstrap errors.
    pub async fn from_config(config: AppConfig) -> Result<(Self, StageContext)> {
        let pool = opine_db::connect(&config).await?;
        opine_db::schema::ensure_schema(&pool).await?;

        let cache: Arc<dyn Cache> = match &config.cache_url {
            Some(url) => {
                info!(url, "using Redis cache backend");
                Arc::new(RedisCache::connect(url).await?)
            },
            None => {
                info!("no cache URL configured, using in-process cache");
                Arc::new(MemoryCache::new())
            },
        };

        let queue: Arc<dyn JobQueue> = match &config.queue_url {
            Some(url) => {
                info!(url, "using Redis queue backend");
                Arc::new(RedisJobQueue::connect(url).await?)
            },
            None => {
                info!("no queue URL configured, using in-process queues");
                Arc::new(MemoryJobQueue::new())
            },
        };

        let model: Arc<dyn EnrichmentModel> = match (&config.model_url, config.hf_sentiment) {
            (Some(url), true) => {
                info!(url, "using HF sentiment endpoint");
                Arc::new(HttpModel::new(url))
            },
            _ => {
                info!("using lexicon sentiment classifier");
                Arc::new(LexiconModel::new())
            },
        };

        let vector: Arc<dyn VectorIndex> = match &config.vector_url {
            Some(url) => {
                info!(url, "using HTTP vector store");
                Arc::new(HttpVectorIndex::connect(url, opine_workers::model::LEXICON_EMBEDDING_DIM).await?)
            },
            None => {
                info!("no vector store URL configured, using in-process index");
                Arc::new(MemoryVectorIndex::new())
            },
        };

        let feedback = FeedbackRepo::new(pool.clone());
        let store = AnalyticsStore::new(pool.clone());
        let analytics = AnalyticsEngine::new(Arc::new(store.clone()), Arc::clone(&cache));

        let llm = Arc::new(
            HttpLlmClient::new(
                config.llm_url.as_deref().unwrap_or("http://localhost:11434"),
                config.llm_api_key.clone(),
            ),
        );
        let toolbox = Arc::new(LiveToolbox::new(
            analytics.clone(),
            Arc::clone(&vector),
            feedback.clone(),
        ));
        let qa = Arc::new(QaAgent::new(llm, toolbox));

        let ingest = IngestPipeline::new(
            feedback.clone(),
            BatchRepo::new(pool.clone()),
            Arc::clone(&queue),
            config.english_only,
        );

        let stage_context = StageContext::new(
            pool.clone(),
            Arc::clone(&queue),
            Arc::clone(&vector),
            Arc::clone(&cache),
            model,
        );

        let limiter = Arc::new(RateLimiter::new(config.rate_limits));
        let tokens = Arc::new(TokenService::new(
            &config.token_secret,
            config.token_lifetime_secs,
        ));

        let state = Self {
            config: Arc::new(config),
            pool: pool.clone(),
            ingest,
            analytics,
            store,
            feedback,
            annotations: AnnotationRepo::new(pool.clone()),
            topics: TopicRepo::new(pool.clone()),
            audit: AuditRepo::new(pool.clone()),
            batches: BatchRepo::new(pool.clone()),
            conversations: ConversationRepo::new(pool.clone()),
            admin: AdminMutator::new(pool),
            cache,
            queue,
            tokens,
            qa,
            limiter,
        };
        Ok((state, stage_context))
    }
}
