mod cli;

use clap::Parser;
use color_eyre::Result;

use skillsync::config::Config;
use skillsync::logging::{self, LogTarget};
use skillsync::{HttpGateway, MemoryGateway, SyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = cli::Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(base_url) = args.base_url {
    config.api.base_url = base_url;
  }

  let target = if args.log_stderr {
    LogTarget::Stderr
  } else {
    LogTarget::File
  };
  let _log_guard = logging::init(&config.logging, target)?;

  if args.memory {
    let engine = SyncEngine::new(MemoryGateway::with_demo_data()).with_ttl(config.cache.ttl());
    cli::execute(&engine, args.command).await
  } else {
    let gateway = HttpGateway::new(&config.api, &config.resources)?;
    let engine = SyncEngine::new(gateway).with_ttl(config.cache.ttl());
    cli::execute(&engine, args.command).await
  }
}
