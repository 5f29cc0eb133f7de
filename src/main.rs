use clap::Parser;
use tracing_subscriber::EnvFilter;

use kokoro::cli::{self, Args};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    if let Err(e) = cli::run(args) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}
