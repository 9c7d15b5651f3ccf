use std::sync::LazyLock;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardButtonKind};

use super::dialogue::Action;

pub static CREATE_CONFIG: LazyLock<InlineKeyboardButton> = LazyLock::new(|| {
    InlineKeyboardButton::new(
        "🔑 Create config".to_owned(),
        InlineKeyboardButtonKind::CallbackData(
            serde_json::to_string(&Action::CreateConfig).unwrap(),
        ),
    )
});

pub static CREATE_ANOTHER: LazyLock<InlineKeyboardButton> = LazyLock::new(|| {
    InlineKeyboardButton::new(
        "🔑 Create another".to_owned(),
        InlineKeyboardButtonKind::CallbackData(
            serde_json::to_string(&Action::CreateConfig).unwrap(),
        ),
    )
});

pub static MENU: LazyLock<InlineKeyboardButton> = LazyLock::new(|| {
    InlineKeyboardButton::new(
        "📋 Menu".to_owned(),
        InlineKeyboardButtonKind::CallbackData(serde_json::to_string(&Action::OpenMenu).unwrap()),
    )
});
