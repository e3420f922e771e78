use std::net::SocketAddr;
use std::sync::Arc;

use campus_lostfound::classifier::{Classifier, HttpClassifier, NoopClassifier};
use campus_lostfound::config::{Config, StoreBackend};
use campus_lostfound::db::{create_pool, run_migrations, ItemStore, MemoryItemStore, PgItemStore};
use campus_lostfound::http_client::HttpClient;
use campus_lostfound::identifier::{HashCost, IdentifierHasher};
use campus_lostfound::middleware::AuthInterceptor;
use campus_lostfound::notifier::{LogNotifier, Notifier, WebhookNotifier};
use campus_lostfound::proto::health::health_server::HealthServer;
use campus_lostfound::proto::items::items_service_server::ItemsServiceServer;
use campus_lostfound::services::{
    EscalationPolicy, HealthServiceImpl, ItemsServiceImpl, LostFoundService, ServiceSettings,
};
use campus_lostfound::storage::{R2Backend, StorageBackend};

use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Include file descriptor for gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("lostfound_descriptor");

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn ItemStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory item store; reports are lost on restart");
            Ok(Arc::new(MemoryItemStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;

            tracing::info!("Connecting to database...");
            let pool = create_pool(database_url).await?;
            tracing::info!("Database connection established");

            if config.run_migrations {
                run_migrations(&pool).await?;
                tracing::info!("Migrations applied");
            }

            Ok(Arc::new(PgItemStore::new(pool)))
        }
    }
}

fn build_storage(config: &Config) -> Option<Arc<dyn StorageBackend>> {
    let (Some(bucket), Some(account_id), Some(access_key), Some(secret_key)) = (
        config.r2_bucket.clone(),
        config.r2_account_id.clone(),
        config.r2_access_key.clone(),
        config.r2_secret_key.clone(),
    ) else {
        tracing::info!("R2 storage disabled, image uploads are rejected");
        return None;
    };

    match R2Backend::new(
        bucket,
        account_id,
        access_key,
        secret_key,
        config.r2_public_url.clone(),
    ) {
        Ok(backend) => {
            tracing::info!("R2 storage enabled: bucket={}", backend.bucket());
            Some(Arc::new(backend))
        }
        Err(e) => {
            tracing::error!("Failed to create R2 client: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_lostfound=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting campus-lostfound gRPC server...");

    let store = build_store(&config).await?;

    let hasher = IdentifierHasher::new(
        HashCost {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        },
        config.identifier_token_secret.as_deref(),
    )?;
    if config.identifier_token_secret.is_none() {
        tracing::warn!("IDENTIFIER_TOKEN_SECRET not set, matching verifies every candidate");
    }

    let http_client = Arc::new(HttpClient::new()?);

    let classifier: Arc<dyn Classifier> = match &config.classifier_url {
        Some(url) => Arc::new(HttpClassifier::new(url.clone(), http_client.clone())),
        None => Arc::new(NoopClassifier),
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), http_client.clone())),
        None => Arc::new(LogNotifier),
    };

    let settings = ServiceSettings {
        escalation: EscalationPolicy::new(config.escalation_threshold()),
        retention: config.retention(),
        match_pool_limit: config.match_pool_limit,
    };

    let lost_found = Arc::new(LostFoundService::new(
        store,
        hasher,
        settings,
        build_storage(&config),
        classifier,
        notifier,
    ));

    // Periodic retention purge
    if config.retention_sweep_minutes > 0 {
        let sweeper = lost_found.clone();
        let period = std::time::Duration::from_secs(config.retention_sweep_minutes * 60);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = sweeper.purge_expired(chrono::Utc::now()).await {
                    tracing::error!("Retention purge failed: {}", e);
                }
            }
        });
    }

    // Create services
    let items_service = ItemsServiceImpl::new(lost_found);
    let health_service = HealthServiceImpl::new();

    // CORS layer for gRPC-Web
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(Any);

    // Build reflection service
    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    // Parse server address
    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!("Listening on {}", addr);

    // Build and run server with gRPC-Web support
    Server::builder()
        .accept_http1(true) // Required for gRPC-Web
        .layer(TraceLayer::new_for_grpc())
        .layer(cors)
        .layer(tonic_web::GrpcWebLayer::new()) // Enable gRPC-Web
        .add_service(reflection_service)
        .add_service(ItemsServiceServer::with_interceptor(
            items_service,
            AuthInterceptor::new(config.jwt_secret.clone()),
        ))
        .add_service(HealthServer::new(health_service))
        .serve(addr)
        .await?;

    Ok(())
}
