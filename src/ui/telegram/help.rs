use teloxide::utils::{command::BotCommands, markdown::escape};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "start working with the bot")]
    Start,
    #[command(description = "show the main menu")]
    Menu,
    #[command(description = "show this help")]
    Help,
}

pub fn welcome() -> String {
    format!(
        "*{title}*\n\n{body}",
        title = escape("🔐 WireGuard VPN Bot"),
        body = escape(
            "This bot creates WireGuard configs for connecting to the VPN server.

• creates a new client config
• deploys it to the server automatically
• protected by a PIN

Press the button below and enter the PIN to create a config."
        )
    )
}

pub fn text() -> String {
    escape(&format!(
        "{commands}

How to use:
1. Press /start
2. Press \"Create config\"
3. Reply with the PIN
4. Reply with a name for the config (2-20 characters: a-z, 0-9, - and _)
5. Import the .conf file you receive into the WireGuard app",
        commands = Command::descriptions(),
    ))
}
