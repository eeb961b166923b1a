use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use window_limiter::{Config, MemoryStore, RateLimitAlgorithm, RedisStore, WindowLimiter};

/// Issue a series of requests for one identity and report each decision.
#[derive(Debug, Parser)]
#[command(name = "window-limiter", version, about)]
struct Args {
    /// Identity the requests are counted against
    #[arg(long, default_value = "user1")]
    identity: String,

    /// Number of requests to issue
    #[arg(long, default_value_t = 7)]
    requests: u32,

    /// Pause between requests in milliseconds
    #[arg(long, default_value_t = 2000)]
    interval_ms: u64,

    /// Window size in seconds, overriding WINDOW_SIZE_SECS
    #[arg(long)]
    window: Option<u64>,

    /// Max requests per window, overriding MAX_REQUESTS
    #[arg(long)]
    max_requests: Option<u64>,

    /// Keep counters in process memory instead of Redis
    #[arg(long)]
    memory: bool,

    /// Print each decision as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("window_limiter={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = config.limiter_settings();
    if let Some(window) = args.window {
        settings.window_size = Duration::from_secs(window);
    }
    if let Some(max_requests) = args.max_requests {
        settings.max_requests = max_requests;
    }

    tracing::info!(
        "Limiter: window={}s, max_requests={}, weighting={}",
        settings.window_secs(),
        settings.max_requests,
        settings.weighting
    );

    let limiter: Box<dyn RateLimitAlgorithm> = if args.memory {
        tracing::info!("Using in-memory counter store");
        Box::new(WindowLimiter::with_settings(MemoryStore::new(), settings)?)
    } else {
        tracing::info!("Using Redis counter store at {}", config.redis_url);
        let store = RedisStore::connect(&config.redis_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;
        store.ping().await?;
        Box::new(WindowLimiter::with_settings(store, settings)?)
    };

    let interval = Duration::from_millis(args.interval_ms);
    for i in 1..=args.requests {
        match limiter.decide(&args.identity).await {
            Ok(decision) if args.json => println!("{}", serde_json::to_string(&decision)?),
            Ok(decision) if decision.admitted => println!("Request {} allowed", i),
            Ok(_) => println!("Request {} denied", i),
            Err(e) => println!("Error: {}", e),
        }

        if i < args.requests {
            tokio::time::sleep(interval).await;
        }
    }

    Ok(())
}
