#![cfg(not(tarpaulin_include))]

use categorizer::app;
use categorizer::config::Config;

/// Entry point for the categorizer web server.
///
/// Reads configuration from the environment (and `.env`), then serves the
/// upload, edit and export API until the process is stopped. Logging is
/// controlled with `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await?;

    Ok(())
}
