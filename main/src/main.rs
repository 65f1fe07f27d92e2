use std::sync::Arc;

use common::{storage::db::SurrealDbClient, utils::config::get_config};
use enrichment_pipeline::{
    consumer::EnricherConsumer,
    kafka::KafkaSettings,
    pipeline::{DefaultPipelineServices, EnrichmentConfig, EnrichmentPipeline},
};
use retrieval_pipeline::ModelRegistry;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    // Tables and indexes must exist (with the right vector dimension) before
    // the first message arrives.
    db.ensure_initialized(config.embedding_dimensions).await?;

    // Model handles are process-scoped; a dimension mismatch aborts startup.
    let registry = Arc::new(ModelRegistry::from_config(&config).await?);

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let services = Arc::new(DefaultPipelineServices::new(
        Arc::clone(&db),
        openai_client,
        config.clone(),
        registry,
    ));
    let pipeline =
        EnrichmentPipeline::with_config(services, EnrichmentConfig::from_app_config(&config));

    let settings = KafkaSettings::from_app_config(&config);
    let consumer = EnricherConsumer::new(settings, pipeline)?;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for shutdown signal");
        }
    };

    consumer.run(shutdown).await?;

    info!("enricher stopped");
    Ok(())
}
