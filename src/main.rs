use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use traffic_pipeline::config::Config;
use traffic_pipeline::pipeline::Pipeline;

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,traffic_pipeline=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Traffic pipeline starting...");

    // Load configuration
    let config = Config::load("config/config.yaml").map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {}\n\n\
             Make sure:\n\
             1. config/config.yaml exists\n\
             2. All referenced environment variables are set\n\
             3. Create a .env file if needed",
            e
        )
    })?;
    info!("Configuration loaded");

    let data_paths = config.data.clone();
    let report = Pipeline::new(config).run().map_err(|e| {
        anyhow::anyhow!(
            "Pipeline run failed: {}\n\n\
             Inputs:\n\
             - sensors: {}\n\
             - weather: {}\n\
             - gps:     {}\n\
             - events:  {}",
            e,
            data_paths.sensors.display(),
            data_paths.weather.display(),
            data_paths.gps.display(),
            data_paths.events.display()
        )
    })?;

    println!("{}", report);

    info!("Traffic pipeline finished");
    Ok(())
}
