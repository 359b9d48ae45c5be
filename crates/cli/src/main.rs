use clap::Parser;
use pairlink_cli::{cli::Cli, logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	server::run(cli).await
}
