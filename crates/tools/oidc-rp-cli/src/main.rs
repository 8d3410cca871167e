use clap::Parser;
use tracing_subscriber::EnvFilter;

use oidc_rp_cli::cli::{self, Args};
use oidc_rp_cli::error::ToolError;

#[tokio::main]
async fn main() -> Result<(), ToolError> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let settings = match args.load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match args.execute(settings).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            if cli::is_failure(&output) {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}
