use edgewatch::app::config::Config;
use edgewatch::app::context::AppContext;
use edgewatch::app::scheduler::Scheduler;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    config.init_logging();

    if let Err(err) = run(config).await {
        error!(error = %err, "Fatal error");
        std::process::exit(1);
    }

    info!("edgewatch stopped");
}

async fn run(config: Config) -> anyhow::Result<()> {
    let enable_scheduler = config.enable_scheduler;
    let ctx = AppContext::initialize(config)?;
    info!(
        scheduler = enable_scheduler,
        authenticated = ctx.client.is_authenticated(),
        "edgewatch starting"
    );

    let scheduler = if enable_scheduler {
        Some(Scheduler::start(ctx))
    } else {
        info!("Scheduler disabled on this process; serving store readers only");
        None
    };

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Some(scheduler) = scheduler {
        scheduler.shutdown();
    }
    Ok(())
}
