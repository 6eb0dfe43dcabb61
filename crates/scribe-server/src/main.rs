mod config;
mod seed;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use scribe_api::mail::LogMailer;
use scribe_api::{AppState, AppStateInner};
use scribe_db::Database;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "scribe", version, about = "Scribe blogging server")]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve,

    /// Apply migrations and seed the built-in roles, then exit.
    Deploy,

    /// Fill the database with demo users and posts.
    Fake {
        #[arg(long, default_value_t = 100)]
        users: usize,

        #[arg(long, default_value_t = 100)]
        posts: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribe=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Migrations run on open; roles are upserted so every start sees the current set.
    let db = Database::open(&config.db_path)?;
    db.insert_roles()?;

    match cli.cmd.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db).await,
        Command::Deploy => {
            info!("Database at {} is up to date", config.db_path.display());
            Ok(())
        }
        Command::Fake { users, posts } => {
            seed::users(&db, users)?;
            if posts > 0 {
                seed::posts(&db, posts)?;
            }
            Ok(())
        }
    }
}

async fn serve(config: Config, db: Database) -> anyhow::Result<()> {
    let state: AppState = Arc::new(AppStateInner::new(db, config.settings, Arc::new(LogMailer)));

    let app = scribe_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Scribe server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
