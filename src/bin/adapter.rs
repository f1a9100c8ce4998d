use clap::Parser;
use service_discovery::config::Config;
use service_discovery::signal::shutdown_signal;
use service_discovery::{adapter, telemetry};

#[derive(Parser)]
#[command(name = "service-discovery-adapter")]
struct Args {
    /// Path to the JSON configuration document (spec.md §6).
    #[arg(long, default_value = "config/adapter.json")]
    config: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    telemetry::init_tracing(&config.log_level);

    if let Err(e) = adapter::run(config, shutdown_signal()).await {
        tracing::error!(error = %e, "adapter exited with error");
        std::process::exit(e.exit_code());
    }
}
