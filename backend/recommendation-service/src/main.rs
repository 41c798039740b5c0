use actix_web::{web, App, HttpServer};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recommendation_service::config::Config;
use recommendation_service::db::{
    EventStore, InteractionStore, ModelStore, PgEventRepo, PgInteractionRepo, PgModelRepo,
    PgPipelineStateRepo, PgProfileRepo, PgRecommendationRepo, PipelineStateStore, ProfileStore,
    RecommendationStore,
};
use recommendation_service::handlers::{self, ApiState};
use recommendation_service::jobs::run_pipeline_loop;
use recommendation_service::services::pipeline::CycleLease;
use recommendation_service::services::{
    CfTrainer, ContentScorer, HybridRanker, InteractionAggregator, Pipeline,
};
use run_lease::RunLease;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    tracing::info!(
        "Starting {} v{}",
        config.service.service_name,
        env!("CARGO_PKG_VERSION")
    );

    // Initialize database
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to create database pool");

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis client (pipeline run lease)
    let redis_client =
        redis::Client::open(config.redis.url.clone()).expect("Failed to create Redis client");

    // Storage
    let events: Arc<dyn EventStore> = Arc::new(PgEventRepo::new(pool.clone()));
    let interactions: Arc<dyn InteractionStore> = Arc::new(PgInteractionRepo::new(pool.clone()));
    let profiles: Arc<dyn ProfileStore> = Arc::new(PgProfileRepo::new(pool.clone()));
    let models: Arc<dyn ModelStore> = Arc::new(PgModelRepo::new(pool.clone()));
    let recommendations: Arc<dyn RecommendationStore> =
        Arc::new(PgRecommendationRepo::new(pool.clone()));
    let pipeline_state: Arc<dyn PipelineStateStore> = Arc::new(PgPipelineStateRepo::new(pool));

    // Pipeline components
    let aggregator = InteractionAggregator::new(
        Arc::clone(&events),
        Arc::clone(&interactions),
        Arc::clone(&profiles),
        Arc::clone(&pipeline_state),
        config.aggregator.clone(),
    );
    let trainer = CfTrainer::new(
        Arc::clone(&interactions),
        Arc::clone(&models),
        config.trainer.clone(),
    );
    let content = ContentScorer::new(
        config.content.weights.clone(),
        config.content.experience_tolerance_years,
    );
    let ranker = HybridRanker::new(
        Arc::clone(&interactions),
        Arc::clone(&profiles),
        Arc::clone(&models),
        Arc::clone(&recommendations),
        content,
        config.hybrid.clone(),
    );
    let lease: Arc<dyn CycleLease> = Arc::new(RunLease::new(
        redis_client,
        config.pipeline.lease_key.clone(),
        Duration::from_secs(config.pipeline.lease_ttl_secs),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline = Arc::new(Pipeline::new(
        aggregator,
        trainer,
        ranker,
        Arc::clone(&pipeline_state),
        lease,
        shutdown_rx.clone(),
    ));

    // Scheduled batch work lives on its own task, never on the request path.
    let runner = tokio::spawn(run_pipeline_loop(
        pipeline,
        Duration::from_secs(config.pipeline.interval_secs),
        shutdown_rx,
    ));

    let api_state = web::Data::new(ApiState {
        recommendations,
        pipeline_state,
    });

    // Start HTTP server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(api_state.clone())
            .service(handlers::get_recommendations)
            .service(handlers::get_pipeline_status)
            .service(handlers::health)
    })
    .bind(("0.0.0.0", config.service.port))?
    .run();

    tracing::info!("HTTP server listening on port {}", config.service.port);

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    server_handle.stop(true).await;
    let _ = runner.await;

    match server_task.await {
        Ok(result) => result,
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}
