//! Mirror Client - walks a paginated REST resource page by page.
//!
//! Every record is printed to stdout as one JSON line; progress is logged.

use mirror_client::Config;
use mirror_engine::FetchOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror_client=debug,mirror_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Reading {} from {}", config.resource, config.base_url);

    let collection = mirror_client::connect(&config)?;
    let options = FetchOptions {
        replace: true,
        ..FetchOptions::default()
    };

    let mut pages = 0u32;
    loop {
        collection.fetch(options.clone()).await?;
        pages += 1;

        let state = collection.state();
        tracing::info!(
            page = state.current_page,
            total_pages = state.total_pages,
            count = state.count,
            records = collection.len(),
            "fetched page"
        );

        for model in collection.models() {
            println!("{}", serde_json::to_string(&model.to_json())?);
        }

        if state.next.is_none() {
            break;
        }
        if config.max_pages.is_some_and(|max| pages >= max) {
            tracing::info!("Stopping after {} pages", pages);
            break;
        }
    }

    Ok(())
}
