use clap::Parser;
use nestegg::api::cli::{Cli, run};
use nestegg::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
