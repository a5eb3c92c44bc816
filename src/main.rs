use std::sync::Arc;

use clap::Parser;
use feedriver::cancel::CancelFlag;
use feedriver::clock::SystemClock;
use feedriver::orchestrator::Orchestrator;
use feedriver::store::{self, feeds};
use feedriver::{cli::Cli, cli::Commands, Result, Settings};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,feedriver=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    settings.validate()?;

    let pool = store::init_pool(&settings.database_path).await?;
    store::run_migrations(&pool).await?;

    match cli.command {
        Commands::Poll => {
            let exit_code = poll(pool, &settings).await?;
            std::process::exit(exit_code);
        }
        Commands::Migrate => {
            info!("migrations already applied during startup");
        }
        Commands::AddFeed { url, title } => {
            let id = feeds::add_feed(&pool, &url, &title).await?;
            println!("added feed {id}: {url}");
        }
        Commands::RemoveFeed { id } => {
            feeds::remove_feed(&pool, id).await?;
            println!("removed feed {id}");
        }
        Commands::ListFeeds { active_only } => {
            let all = feeds::get_feeds(&pool, active_only).await?;
            for feed in all {
                println!(
                    "{:>4}  {:<50}  active={}  errors={}  last_error={}",
                    feed.id,
                    feed.url,
                    feed.active,
                    feed.fetch_error_count,
                    feed.fetch_error.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Prune { days, filter_by } => {
            let deleted = store::entries::prune_entries(&pool, days, &filter_by, chrono::Utc::now()).await?;
            println!("pruned {deleted} entries older than {days} days ({filter_by})");
        }
    }

    Ok(())
}

async fn poll(pool: store::DbPool, settings: &Settings) -> Result<i32> {
    let clock = Arc::new(SystemClock);
    let orchestrator = Arc::new(Orchestrator::new(pool, settings, clock)?);
    let cancel = CancelFlag::new();

    let sigint = tokio::signal::ctrl_c();
    tokio::pin!(sigint);
    let fetch_cycle = orchestrator.fetch_all(settings.concurrent_fetches, &cancel);
    tokio::pin!(fetch_cycle);

    let summary = tokio::select! {
        result = &mut fetch_cycle => result?,
        _ = &mut sigint => {
            warn!("received Ctrl+C, cancelling in-flight fetches");
            cancel.cancel();
            fetch_cycle.await?
        }
    };

    info!(
        fetched = summary.fetched,
        not_modified = summary.not_modified,
        failed = summary.failed,
        redirected = summary.redirected,
        "poll cycle complete"
    );

    if summary.all_failed() {
        warn!("every feed failed this cycle");
        Ok(1)
    } else {
        Ok(0)
    }
}

