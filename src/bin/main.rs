use clap::Parser;
use quantcli::cli::{self, Cli, Services};
use quantcli::observability::{DebugConfig, DebugLog};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // stdout is reserved for the JSON document
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let debug = DebugLog::from_config(&DebugConfig::from_env());

    let mut stdout = std::io::stdout();
    let code = cli::run(&args.query_text(), debug, Services::from_env, &mut stdout).await;

    ExitCode::from(code)
}
