mod buttons;
mod dialogue;
mod help;

use clap::Parser;
use teloxide::{
    dispatching::dialogue::InMemStorage, prelude::*, types::ParseMode, utils::markdown::escape,
};

use std::{error::Error, sync::Arc};

use crate::service::{Provisioner, ServiceError};

/// Shared-secret check guarding config creation.
pub struct PinGate {
    pin: String,
}

impl PinGate {
    pub fn new(pin: String) -> Self {
        Self { pin }
    }

    pub fn check(&self, input: &str) -> bool {
        input.trim() == self.pin
    }
}

/// Bold title plus body, escaped for MarkdownV2.
fn notice(title: &str, body: &str) -> String {
    format!("*{}*\n\n{}", escape(title), escape(body))
}

fn describe(e: &ServiceError) -> String {
    match e {
        ServiceError::Validation(e) => notice("❌ Invalid name!", &e.to_string()),
        ServiceError::NameCollision(name) => notice(
            &format!("❌ A config named '{name}' already exists!"),
            "Please choose another name.",
        ),
        ServiceError::AddressSpaceExhausted => notice(
            "❌ Could not create config",
            "No free addresses are left on the server.",
        ),
        e => notice("❌ Could not create config", &e.to_string()),
    }
}

#[derive(Debug, Parser)]
pub struct Config {
    #[clap(long, env = "TELEGRAM_TOKEN", hide_env_values = true, value_parser)]
    token: String,
    #[clap(long, env = "ACCESS_PIN", hide_env_values = true, value_parser)]
    pin: String,
}

pub async fn start(
    config: Config,
    service: Provisioner,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing::info!("Starting provisioning bot...");

    let bot = Bot::new(config.token).parse_mode(ParseMode::MarkdownV2);

    let ignore_update = |upd: Arc<Update>| {
        Box::pin(async move { tracing::debug!("unhandled update: {:?}", upd.kind) })
    };

    Dispatcher::builder(bot, dialogue::entry())
        .dependencies(dptree::deps![
            InMemStorage::<dialogue::State>::new(),
            Arc::new(service),
            Arc::new(PinGate::new(config.pin))
        ])
        .default_handler(ignore_update)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}
