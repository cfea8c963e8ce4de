use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;

use pokemon_etl::api::PokemonApi;
use pokemon_etl::auth::AuthManager;
use pokemon_etl::config;
use pokemon_etl::export;
use pokemon_etl::http_client::ApiHttpClient;
use pokemon_etl::models::EndpointKind;
use pokemon_etl::pipeline::Pipeline;
use pokemon_etl::throttle::Pacer;

#[tokio::main]
async fn main() -> Result<()> {
    // Check if interactive setup is needed (no .env and missing required values)
    if config::needs_interactive_setup() {
        let interactive_config = config::run_interactive_setup()?;

        // Set environment variables from interactive config so Config::load() can use them
        std::env::set_var("API_BASE_URL", &interactive_config.api_base_url);
        std::env::set_var("API_USERNAME", &interactive_config.api_username);
        std::env::set_var("API_PASSWORD", &interactive_config.api_password);
    }

    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("🚀 Pokemon ETL starting...");
    tracing::info!("API: {}", config.api_base_url);
    tracing::debug!("Endpoints: {:?}", config.endpoints);

    let auth_manager = Arc::new(AuthManager::new(
        config.login_url(),
        config.credentials.clone(),
        config.login_timeout,
    )?);

    let http_client = Arc::new(ApiHttpClient::new(
        &config.api_base_url,
        auth_manager.clone(),
        config.http_request_timeout,
        config.retry_policy(),
    )?);

    let api = PokemonApi::new(http_client, config.endpoints.clone());

    if config.probe {
        return probe(&api).await;
    }

    let pipeline = Pipeline::new(
        api,
        Pacer::new(config.pace_min, config.pace_max),
        config.per_page,
    );

    let datasets = match pipeline.run().await {
        Ok(datasets) => datasets,
        Err(e) => {
            tracing::error!("❌ Extraction failed: {}", e);
            anyhow::bail!("Extraction failed: {}", e);
        }
    };

    let files = export::write_datasets(&datasets, &config.data_dir)?;
    tracing::info!("✅ Files written:");
    for file in &files {
        tracing::info!("- {}", file.display());
    }
    tracing::info!("Logins performed: {}", auth_manager.login_count());

    Ok(())
}

/// Log in and print one sample from each endpoint
async fn probe(api: &PokemonApi) -> Result<()> {
    println!("Testing login...");
    api.http().auth().login().await?;
    if let Some(token) = api.http().auth().current().await {
        println!(
            "Token {}... ({}) obtained at {}",
            token.preview(),
            token.scheme,
            token.obtained_at.to_rfc3339()
        );
    }

    println!("\n/health:");
    print_json(&api.health().await?.unwrap_or(Value::Null));

    println!("\nPokemons (page=1, per_page=10):");
    let page = api.list_page(EndpointKind::Pokemons, 1, 10).await?;
    print_json(&json!({
        "pokemons": page.items,
        "page": page.page,
        "per_page": page.per_page,
        "total": page.total,
    }));

    println!("\nPokemon attributes (id 25):");
    print_json(&api.get_attributes("25").await?.unwrap_or(Value::Null));

    println!("\nCombats (page=1):");
    let page = api.list_page(EndpointKind::Combats, 1, 10).await?;
    print_json(&json!({
        "combats": page.items,
        "page": page.page,
        "per_page": page.per_page,
        "total": page.total,
    }));

    Ok(())
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
