mod access;
mod service;
mod ui;

use clap::Parser;
use service::{Provisioner, ReloadStrategy};
use tracing::{info, warn};

#[derive(Debug, Parser)]
struct Config {
    #[clap(flatten)]
    access: access::Config,
    #[clap(flatten)]
    service: service::Config,

    #[clap(flatten)]
    bot: ui::telegram::Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    pretty_env_logger::init();

    let config = Config::parse();

    let backend = config.access.backend();
    let access = config.access.build()?;

    let service = Provisioner::new(config.service, access, ReloadStrategy::default_for(backend))?;
    info!(
        "provisioning clients for {} over the {backend:?} backend",
        service.server().endpoint()
    );

    for f in ui::run(config.bot, service) {
        f.await??;

        warn!("frontend stopped")
    }

    Ok(())
}
