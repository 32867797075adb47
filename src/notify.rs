//! Delivery wrapper over the bot API: one bounded retry per send, and
//! fan-out helpers that keep going when a single recipient is unreachable.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{FileId, InlineKeyboardMarkup, InputFile, ParseMode};

use crate::error::BotError;

const RETRY_DELAY: Duration = Duration::from_millis(500);

pub async fn send_text(bot: &Bot, chat_id: i64, text: &str) -> Result<(), BotError> {
    let first = bot
        .send_message(ChatId(chat_id), text)
        .parse_mode(ParseMode::Html)
        .await;
    if let Err(e) = first {
        warn!("send to {} failed, retrying once: {}", chat_id, e);
        tokio::time::sleep(RETRY_DELAY).await;
        bot.send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await?;
    }
    Ok(())
}

pub async fn send_photo_with_buttons(
    bot: &Bot,
    chat_id: i64,
    proof_ref: &str,
    caption: &str,
    markup: InlineKeyboardMarkup,
) -> Result<(), BotError> {
    let photo = InputFile::file_id(FileId(proof_ref.to_string()));
    let first = bot
        .send_photo(ChatId(chat_id), photo.clone())
        .caption(caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(markup.clone())
        .await;
    if let Err(e) = first {
        warn!("photo send to {} failed, retrying once: {}", chat_id, e);
        tokio::time::sleep(RETRY_DELAY).await;
        bot.send_photo(ChatId(chat_id), photo)
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(markup)
            .await?;
    }
    Ok(())
}

/// Text to every admin; a failed recipient is logged and skipped.
pub async fn broadcast_text(bot: &Bot, recipients: &[i64], text: &str) {
    for &id in recipients {
        if let Err(e) = send_text(bot, id, text).await {
            error!("failed to deliver to {}: {}", id, e);
        }
    }
}

/// Proof photo with approve/reject buttons to every admin, same isolation.
pub async fn broadcast_photo(
    bot: &Bot,
    recipients: &[i64],
    proof_ref: &str,
    caption: &str,
    markup: &InlineKeyboardMarkup,
) {
    for &id in recipients {
        if let Err(e) =
            send_photo_with_buttons(bot, id, proof_ref, caption, markup.clone()).await
        {
            error!("failed to deliver proof to {}: {}", id, e);
        }
    }
}
