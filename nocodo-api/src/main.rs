use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use nocodo_api::{configure, spawn_background_tasks, ApiConfig, AppState};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "nocodo-api")]
#[command(about = "Question and push-stream server for agent jobs", long_about = None)]
struct Cli {
    /// Config file, defaults to <config dir>/nocodo/interaction.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = ApiConfig::load(cli.config)?;

    let log_dir = config.logging.log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "nocodo-api.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    info!(config = %config_path.display(), log_dir = %log_dir.display(), "Loaded configuration");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let allowed_origins = config.cors.allowed_origins.clone();
    let state = web::Data::new(AppState::new(config));
    let workers = spawn_background_tasks(&state);

    info!("Starting nocodo-api server at http://{}", bind_addr);

    let server_state = state.clone();
    HttpServer::new(move || {
        let cors = allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(server_state.clone())
            .configure(configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("Server stopped, cancelling open streams");
    for worker in workers {
        worker.abort();
    }
    state.streams.reset().await;
    state.store.reset();
    Ok(())
}
