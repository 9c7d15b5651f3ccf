use std::{error::Error, sync::Arc};

use serde::{Deserialize, Serialize};
use teloxide::{
    adaptors::DefaultParseMode,
    dispatching::{
        dialogue::{Dialogue, InMemStorage},
        DpHandlerDescription, HandlerExt, UpdateFilterExt,
    },
    dptree,
    payloads::{SendDocumentSetters, SendMessageSetters},
    prelude::{DependencyMap, Endpoint},
    requests::Requester,
    types::{
        CallbackQuery, ChatId, ForceReply, InlineKeyboardMarkup, InputFile, Message, MessageId,
        Update,
    },
    utils::markdown::escape,
    Bot,
};
use tracing::{info, warn};

use super::{
    buttons, describe,
    help::{self, Command},
    notice, PinGate,
};
use crate::service::{ClientName, Provisioner, ServiceError};

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;
type MyDialogue = Dialogue<State, InMemStorage<State>>;

const NAME_HINT: &str = "Reply with a name for the config (for example: phone, laptop, tablet).";

/// One config creation attempt per chat. Prompts are force-replies and only
/// replies to the latest prompt are accepted.
#[derive(Clone, Default)]
pub enum State {
    #[default]
    Idle,
    WaitingPin {
        prompt: MessageId,
    },
    WaitingName {
        prompt: MessageId,
    },
}

#[derive(Deserialize, Serialize, Clone)]
pub(super) enum Action {
    CreateConfig,
    OpenMenu,
}

pub fn entry() -> Endpoint<
    'static,
    DependencyMap,
    Result<(), Box<dyn Error + Send + Sync + 'static>>,
    DpHandlerDescription,
> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Update, InMemStorage<State>, State>()
                .branch(dptree::entry().filter_command::<Command>().endpoint(command))
                .branch(dptree::case![State::WaitingPin { prompt }].endpoint(pin_input))
                .branch(dptree::case![State::WaitingName { prompt }].endpoint(name_input))
                .branch(dptree::endpoint(idle)),
        )
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<Update, InMemStorage<State>, State>()
                .endpoint(callback_handler),
        )
}

fn replies_to(msg: &Message, prompt: MessageId) -> bool {
    msg.reply_to_message().map(|m| m.id) == Some(prompt)
}

async fn send_menu(bot: &DefaultParseMode<Bot>, chat: ChatId, with_menu: bool) -> HandlerResult {
    let mut rows = vec![vec![buttons::CREATE_CONFIG.clone()]];
    if with_menu {
        rows.push(vec![buttons::MENU.clone()]);
    }

    bot.send_message(chat, help::welcome())
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

async fn prompt_name(
    bot: &DefaultParseMode<Bot>,
    dialogue: &MyDialogue,
    chat: ChatId,
    text: String,
) -> HandlerResult {
    let prompt = bot
        .send_message(chat, text)
        .reply_markup(ForceReply::new())
        .await?;
    dialogue
        .update(State::WaitingName { prompt: prompt.id })
        .await?;
    Ok(())
}

async fn command(
    bot: DefaultParseMode<Bot>,
    dialogue: MyDialogue,
    msg: Message,
    command: Command,
) -> HandlerResult {
    match command {
        Command::Start => {
            dialogue.exit().await?;
            send_menu(&bot, msg.chat.id, false).await?;
        }
        Command::Menu => {
            dialogue.exit().await?;
            send_menu(&bot, msg.chat.id, true).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, help::text()).await?;
        }
    };

    Ok(())
}

async fn idle(bot: DefaultParseMode<Bot>, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, escape("Use /start to begin."))
        .await?;
    Ok(())
}

async fn pin_input(
    bot: DefaultParseMode<Bot>,
    dialogue: MyDialogue,
    msg: Message,
    prompt: MessageId,
    gate: Arc<PinGate>,
) -> HandlerResult {
    let (Some(pin), true) = (msg.text(), replies_to(&msg, prompt)) else {
        bot.send_message(
            msg.chat.id,
            escape("Please enter the PIN by replying to the PIN prompt."),
        )
        .await?;
        return Ok(());
    };

    if gate.check(pin) {
        prompt_name(
            &bot,
            &dialogue,
            msg.chat.id,
            notice("✅ PIN accepted!", NAME_HINT),
        )
        .await?;
    } else {
        info!("wrong pin from chat {}", msg.chat.id.0);
        bot.send_message(
            msg.chat.id,
            notice("❌ Wrong PIN!", "Press /start to try again."),
        )
        .await?;
        dialogue.exit().await?;
    }

    Ok(())
}

async fn name_input(
    bot: DefaultParseMode<Bot>,
    dialogue: MyDialogue,
    msg: Message,
    prompt: MessageId,
    service: Arc<Provisioner>,
) -> HandlerResult {
    let chat = msg.chat.id;
    let (Some(text), true) = (msg.text(), replies_to(&msg, prompt)) else {
        return prompt_name(&bot, &dialogue, chat, escape(NAME_HINT)).await;
    };

    let name = match text.trim().to_lowercase().parse::<ClientName>() {
        Ok(name) => name,
        Err(e) => return prompt_name(&bot, &dialogue, chat, describe(&e.into())).await,
    };

    match service.name_exists(&name).await {
        Ok(false) => {}
        Ok(true) => {
            let e = ServiceError::NameCollision(name);
            return prompt_name(&bot, &dialogue, chat, describe(&e)).await;
        }
        Err(e) => {
            dialogue.exit().await?;
            bot.send_message(chat, describe(&e)).await?;
            return Ok(());
        }
    }

    bot.send_message(
        chat,
        notice(
            "⏳ Creating config...",
            "Please wait, this may take a few seconds.",
        ),
    )
    .await?;

    match service.provision(&name).await {
        Ok(config) => {
            dialogue.exit().await?;
            bot.send_document(
                chat,
                InputFile::memory(config.into_bytes()).file_name(format!("{name}.conf")),
            )
            .caption(notice(
                "✅ Config created!",
                &format!("📁 File: {name}.conf\n📱 Import it into the WireGuard app."),
            ))
            .await?;
            bot.send_message(
                chat,
                notice(
                    "🎉 Done!",
                    "Your WireGuard config is deployed and ready to use.",
                ),
            )
            .reply_markup(InlineKeyboardMarkup::new([[buttons::CREATE_ANOTHER.clone()]]))
            .await?;
        }
        // lost a race with another chat for the same name
        Err(e @ ServiceError::NameCollision(_)) => {
            prompt_name(&bot, &dialogue, chat, describe(&e)).await?;
        }
        Err(e) => {
            warn!("provisioning {name} failed: {e}");
            dialogue.exit().await?;
            bot.send_message(chat, describe(&e)).await?;
        }
    }

    Ok(())
}

async fn callback_handler(
    bot: DefaultParseMode<Bot>,
    dialogue: MyDialogue,
    q: CallbackQuery,
) -> HandlerResult {
    let Some(data) = q.data else {
        return Ok(());
    };
    let action: Action = serde_json::from_str(&data)?;
    bot.answer_callback_query(q.id).await?;

    let chat = dialogue.chat_id();
    match action {
        Action::CreateConfig => {
            let prompt = bot
                .send_message(
                    chat,
                    notice("🔐 Enter the PIN", "Reply to this message with the access PIN."),
                )
                .reply_markup(ForceReply::new())
                .await?;
            dialogue
                .update(State::WaitingPin { prompt: prompt.id })
                .await?;
        }
        Action::OpenMenu => send_menu(&bot, chat, true).await?,
    }

    if let Some(message) = q.message {
        if let Err(e) = bot.delete_message(chat, message.id).await {
            warn!("can't delete menu message: {e}");
        }
    }

    Ok(())
}
