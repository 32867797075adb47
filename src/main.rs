use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

mod callback;
mod config;
mod db;
mod error;
mod handlers;
mod lifecycle;
mod models;
mod notify;
mod reminder;

use config::Config;
use db::get_db_pool;
use handlers::{handle_callback_query, handle_message, UserSession};
use teloxide::{
    dispatching::UpdateFilterExt,
    prelude::*,
    types::CallbackQuery,
};

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    let config = Arc::new(Config::from_env());
    let pool = get_db_pool(&config.database_url).await;
    let bot = Bot::new(config.bot_token.clone());

    let user_sessions = Arc::new(Mutex::new(HashMap::<i64, UserSession>::new()));

    // Daily reminder scan plus the monthly rollover on the 1st.
    tokio::spawn(reminder::scheduler_loop(
        bot.clone(),
        pool.clone(),
        config.as_ref().clone(),
    ));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let pool = pool.clone();
            let config = config.clone();
            let user_sessions = user_sessions.clone();

            move |bot: Bot, msg: Message| {
                let pool = pool.clone();
                let config = config.clone();
                let user_sessions = user_sessions.clone();

                async move {
                    let mut sessions = user_sessions.lock().await;
                    if let Err(e) =
                        handle_message(msg, bot, pool, config, &mut sessions).await
                    {
                        error!("message handler failed: {}", e);
                    }
                    respond(())
                }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let pool = pool.clone();
            let config = config.clone();
            let user_sessions = user_sessions.clone();

            move |q: CallbackQuery, bot: Bot| {
                let pool = pool.clone();
                let config = config.clone();
                let user_sessions = user_sessions.clone();

                async move {
                    let mut sessions = user_sessions.lock().await;
                    let message = q
                        .message
                        .clone()
                        .and_then(|m| m.regular_message().cloned());
                    if let Some(message) = message {
                        if let Err(e) =
                            handle_callback_query(q, bot, message, pool, config, &mut sessions)
                                .await
                        {
                            error!("callback handler failed: {}", e);
                        }
                    }
                    respond(())
                }
            }
        }));

    info!("starting dispatcher");
    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
