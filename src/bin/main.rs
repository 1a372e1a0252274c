use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use llm_gateway::api::{ApiServer, AppState};
use llm_gateway::cli::{commands, Cli, Commands};
use llm_gateway::{
    Authenticator, BillingSweeper, Config, Database, Dispatcher, HealthProber, InMemoryCache,
    RedisCache,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Ok(Config::from_env()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    llm_gateway::observability::init_tracing(&config.logging);

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await,
        Commands::Setup(args) => commands::setup(&config, &args)
            .await
            .map_err(anyhow::Error::from),
        Commands::Test(args) => commands::test(&args).await.map_err(anyhow::Error::from),
        Commands::Cleanup => commands::cleanup(&config, "gateway-test")
            .await
            .map_err(anyhow::Error::from),
        Commands::Quotas(args) => commands::quotas(&config, &args)
            .await
            .map_err(anyhow::Error::from),
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let db = Database::connect(&config.database)
        .await
        .context("database startup failed")?;

    let cache: llm_gateway::CacheHandle = match &config.cache.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).context("redis connect failed")?),
        None => Arc::new(InMemoryCache::new()),
    };

    let dispatcher = Arc::new(Dispatcher::new(db.pool().clone(), cache.clone(), config));
    let authenticator = Authenticator::new(dispatcher.repos());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let prober = HealthProber::new(
        dispatcher.repos().providers.clone(),
        cache,
        dispatcher.attempt_feed(),
        config.prober.clone(),
    );
    let prober_handle = tokio::spawn(prober.run(shutdown_rx.clone()));

    let sweeper = BillingSweeper::new(db.pool().clone(), config.sweeper.clone());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx.clone()));

    let state = Arc::new(AppState {
        dispatcher,
        authenticator,
        db: db.clone(),
    });
    let server = ApiServer::new(config.server.clone(), state);

    let server_shutdown = shutdown_rx.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    server.run(server_shutdown).await?;

    let _ = tokio::join!(prober_handle, sweeper_handle);
    ctrl_c.abort();
    db.close().await;

    Ok(())
}
