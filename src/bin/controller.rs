use clap::Parser;
use service_discovery::config::Config;
use service_discovery::signal::shutdown_signal;
use service_discovery::{controller, telemetry};

#[derive(Parser)]
#[command(name = "service-discovery-controller")]
struct Args {
    /// Path to the JSON configuration document (spec.md §6).
    #[arg(long, default_value = "config/controller.json")]
    config: String,

    /// This instance's local IP, published in the start message and greet
    /// reply (spec.md §3 StartMessage `host`).
    #[arg(long, default_value = "127.0.0.1")]
    local_host: String,
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

    if let Err(e) = controller::run(config, args.local_host, shutdown_signal()).await {
        tracing::error!(error = %e, "controller exited with error");
        std::process::exit(e.exit_code());
    }
}
