use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use chrono::Local;
use sqlx::PgPool;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Message, ParseMode};

use crate::callback::Callback;
use crate::config::Config;
use crate::db;
use crate::error::BotError;
use crate::lifecycle::{
    self, countdown_text, days_remaining, effective_expiration, status_label, validate_field,
    EditableField, FieldValue,
};
use crate::models::{format_price, Client, NewSubscription, ServiceType, Subscription};
use crate::notify;

const ITEMS_PER_PAGE: usize = 5;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Per-chat scratch state for the multi-step flows. Only fully validated
/// forms ever reach the store; dropping a session mid-flow persists nothing.
pub struct UserSession {
    step: UserStep,
    add: AddForm,
    edit: EditForm,
    list: ListState,
    pending_delete: Option<i64>,
}

impl UserSession {
    fn new() -> Self {
        UserSession {
            step: UserStep::Idle,
            add: AddForm::default(),
            edit: EditForm::default(),
            list: ListState::default(),
            pending_delete: None,
        }
    }

    fn reset(&mut self) {
        *self = UserSession::new();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UserStep {
    Idle,
    // Add flow
    AddChoosingClient,
    AddProvider,
    AddDomain,
    AddServiceType,
    AddRentalDate,
    AddPriceBuy,
    AddPriceSell,
    // Edit flow
    EditChoosingSubscription,
    EditChoosingField,
    EditEnteringValue,
    // Delete flow
    DeleteChoosing,
    DeleteConfirm,
}

#[derive(Default)]
struct AddForm {
    client_user_id: Option<i64>,
    provider: Option<String>,
    domain: Option<String>,
    service_type: Option<ServiceType>,
    rental_date: Option<chrono::NaiveDate>,
    price_buy: Option<i64>,
}

#[derive(Default)]
struct EditForm {
    subscription_id: Option<i64>,
    field: Option<EditableField>,
}

#[derive(Default)]
struct ListState {
    month: Option<String>,
    page: usize,
    items: Vec<Subscription>,
}

fn back_button() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "⬅️ Back to menu",
        Callback::BackToMenu.encode(),
    )]])
}

fn service_type_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = ServiceType::ALL
        .iter()
        .map(|st| {
            vec![InlineKeyboardButton::callback(
                st.as_str(),
                Callback::ChooseServiceType(st.as_str().to_string()).encode(),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "⬅️ Back to menu",
        Callback::BackToMenu.encode(),
    )]);
    InlineKeyboardMarkup::new(rows)
}

fn admin_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "➕ Add subscription",
            Callback::AdminAdd.encode(),
        )],
        vec![InlineKeyboardButton::callback(
            "📋 List subscriptions",
            Callback::AdminList.encode(),
        )],
        vec![InlineKeyboardButton::callback(
            "🔄 Edit subscription",
            Callback::AdminEdit.encode(),
        )],
        vec![InlineKeyboardButton::callback(
            "❌ Delete subscription",
            Callback::AdminDelete.encode(),
        )],
    ])
}

async fn show_admin_menu(bot: &Bot, chat_id: ChatId) -> HandlerResult {
    bot.send_message(chat_id, "🔧 <b>Admin menu</b>")
        .parse_mode(ParseMode::Html)
        .reply_markup(admin_menu_keyboard())
        .await?;
    Ok(())
}

pub async fn handle_message(
    msg: Message,
    bot: Bot,
    pool: PgPool,
    config: Arc<Config>,
    user_sessions: &mut HashMap<i64, UserSession>,
) -> HandlerResult {
    let chat_id = msg.chat.id;

    // A photo at any point is a payment-proof submission.
    if msg.photo().is_some() {
        return handle_payment_proof(&msg, &bot, &pool, &config).await;
    }

    let text = msg.text().unwrap_or("");
    let session = user_sessions
        .entry(chat_id.0)
        .or_insert_with(UserSession::new);

    match text {
        "/start" => {
            session.reset();
            let (full_name, username) = match msg.from.as_ref() {
                Some(user) => (user.full_name(), user.username.clone()),
                None => return Ok(()),
            };
            let client =
                db::ensure_client(&pool, chat_id.0, &full_name, username.as_deref()).await?;
            info!(
                "/start from user_id={} ({}) username={:?}",
                chat_id.0, client.full_name, client.username
            );
            bot.send_message(
                chat_id,
                format!(
                    "👋 Hi {}!\n\n\
                     Your hosting and domain notifications are now active.\n\
                     We will remind you automatically before a service is due.\n\
                     Use /info anytime to check your subscriptions.",
                    client.full_name
                ),
            )
            .await?;
            return Ok(());
        }
        "/admin" => {
            session.reset();
            if !config.is_admin(chat_id.0) {
                warn!("/admin denied for user_id={}", chat_id.0);
                bot.send_message(chat_id, "❌ Access denied. Admins only.")
                    .await?;
                return Ok(());
            }
            show_admin_menu(&bot, chat_id).await?;
            return Ok(());
        }
        "/info" => {
            session.reset();
            return show_client_info(&bot, &pool, chat_id).await;
        }
        "/cancel" => {
            session.reset();
            bot.send_message(chat_id, "❌ Cancelled.")
                .reply_markup(back_button())
                .await?;
            return Ok(());
        }
        _ => {}
    }

    // Text input steps of the admin flows.
    if !config.is_admin(chat_id.0) {
        return Ok(());
    }

    match session.step {
        UserStep::AddProvider => {
            match validate_field(EditableField::Provider, text) {
                Ok(FieldValue::Text(provider)) => {
                    session.add.provider = Some(provider);
                    session.step = UserStep::AddDomain;
                    bot.send_message(chat_id, "Enter the domain:")
                        .reply_markup(back_button())
                        .await?;
                }
                _ => {
                    bot.send_message(chat_id, "⚠️ Provider must not be empty.")
                        .reply_markup(back_button())
                        .await?;
                }
            }
        }
        UserStep::AddDomain => {
            match validate_field(EditableField::Domain, text) {
                Ok(FieldValue::Text(domain)) => {
                    session.add.domain = Some(domain);
                    session.step = UserStep::AddServiceType;
                    bot.send_message(chat_id, "Pick the service type:")
                        .reply_markup(service_type_keyboard())
                        .await?;
                }
                _ => {
                    bot.send_message(chat_id, "⚠️ Domain must not be empty.")
                        .reply_markup(back_button())
                        .await?;
                }
            }
        }
        UserStep::AddRentalDate => match validate_field(EditableField::RentalDate, text) {
            Ok(FieldValue::Date(date)) => {
                if lifecycle::is_past(date, Local::now().date_naive()) {
                    bot.send_message(chat_id, "ℹ️ Note: that date is in the past.")
                        .await?;
                }
                session.add.rental_date = Some(date);
                session.step = UserStep::AddPriceBuy;
                bot.send_message(chat_id, "Enter the buy price (e.g. 100000):")
                    .reply_markup(back_button())
                    .await?;
            }
            Err(e) => {
                bot.send_message(chat_id, e.user_message())
                    .reply_markup(back_button())
                    .await?;
            }
            Ok(_) => {}
        },
        UserStep::AddPriceBuy => match validate_field(EditableField::PriceBuy, text) {
            Ok(FieldValue::Money(price)) => {
                session.add.price_buy = Some(price);
                session.step = UserStep::AddPriceSell;
                bot.send_message(chat_id, "Enter the sell price (e.g. 200000):")
                    .reply_markup(back_button())
                    .await?;
            }
            _ => {
                bot.send_message(chat_id, "⚠️ Enter a non-negative whole number (e.g. 100000).")
                    .reply_markup(back_button())
                    .await?;
            }
        },
        UserStep::AddPriceSell => match validate_field(EditableField::PriceSell, text) {
            Ok(FieldValue::Money(price)) => {
                finish_add_form(&bot, &pool, chat_id, session, price).await?;
            }
            _ => {
                bot.send_message(chat_id, "⚠️ Enter a non-negative whole number (e.g. 200000).")
                    .reply_markup(back_button())
                    .await?;
            }
        },
        UserStep::EditEnteringValue => {
            apply_field_edit(&bot, &pool, chat_id, session, text).await?;
        }
        _ => {}
    }
    Ok(())
}

/// One insert at form completion; an abandoned form never touches the store.
async fn finish_add_form(
    bot: &Bot,
    pool: &PgPool,
    chat_id: ChatId,
    session: &mut UserSession,
    price_sell: i64,
) -> HandlerResult {
    let form = &session.add;
    let (client_user_id, provider, domain, service_type, rental_date, price_buy) = match (
        form.client_user_id,
        form.provider.clone(),
        form.domain.clone(),
        form.service_type,
        form.rental_date,
        form.price_buy,
    ) {
        (Some(c), Some(p), Some(d), Some(st), Some(r), Some(pb)) => (c, p, d, st, r, pb),
        _ => {
            session.reset();
            bot.send_message(chat_id, "❌ Form state lost, please start over.")
                .reply_markup(back_button())
                .await?;
            return Ok(());
        }
    };

    let new = NewSubscription {
        client_user_id,
        provider,
        domain,
        service_type: service_type.as_str().to_string(),
        rental_date,
        // Until the first approval the contract start doubles as due date.
        expiration_date: Some(rental_date),
        price_buy,
        price_sell,
    };

    match db::insert_subscription(pool, &new).await {
        Ok(sub) => {
            info!(
                "subscription {} created for client {} ({})",
                sub.id, sub.client_user_id, sub.domain
            );
            session.reset();
            bot.send_message(chat_id, "✅ Subscription saved.")
                .reply_markup(back_button())
                .await?;
        }
        Err(e) => {
            error!("insert failed: {}", e);
            session.reset();
            bot.send_message(chat_id, e.user_message())
                .reply_markup(back_button())
                .await?;
        }
    }
    Ok(())
}

/// Validated single-field patch; invalid input re-prompts the same field.
async fn apply_field_edit(
    bot: &Bot,
    pool: &PgPool,
    chat_id: ChatId,
    session: &mut UserSession,
    raw: &str,
) -> HandlerResult {
    let (id, field) = match (session.edit.subscription_id, session.edit.field) {
        (Some(id), Some(field)) => (id, field),
        _ => {
            session.reset();
            bot.send_message(chat_id, "❌ Edit state lost, please start over.")
                .reply_markup(back_button())
                .await?;
            return Ok(());
        }
    };

    let value = match validate_field(field, raw) {
        Ok(v) => v,
        Err(e) => {
            bot.send_message(chat_id, e.user_message())
                .reply_markup(back_button())
                .await?;
            return Ok(());
        }
    };

    if let FieldValue::Date(d) | FieldValue::OptionalDate(Some(d)) = &value {
        if lifecycle::is_past(*d, Local::now().date_naive()) {
            bot.send_message(chat_id, "ℹ️ Note: that date is in the past.")
                .await?;
        }
        if let Some(sub) = db::get_subscription(pool, id).await? {
            if lifecycle::breaks_date_order(field, *d, &sub) {
                bot.send_message(
                    chat_id,
                    "ℹ️ Note: that puts the rental date after the expiration date.",
                )
                .await?;
            }
        }
    }

    match db::update_field(pool, id, field, &value).await {
        Ok(()) => {
            info!("subscription {} field {} updated", id, field.column());
            session.reset();
            bot.send_message(chat_id, format!("✅ {} updated.", field.label()))
                .reply_markup(back_button())
                .await?;
        }
        Err(e) => {
            warn!("edit of subscription {} failed: {}", id, e);
            session.reset();
            bot.send_message(chat_id, e.user_message())
                .reply_markup(back_button())
                .await?;
        }
    }
    Ok(())
}

/// The client-facing view of owned subscriptions, with a Pay-Now button on
/// everything not yet approved.
async fn show_client_info(bot: &Bot, pool: &PgPool, chat_id: ChatId) -> HandlerResult {
    let subs = db::list_by_client(pool, chat_id.0).await?;
    if subs.is_empty() {
        bot.send_message(chat_id, "⚠️ You have no registered hosting services yet.")
            .await?;
        return Ok(());
    }

    let today = Local::now().date_naive();
    for sub in subs {
        let expiration = effective_expiration(&sub);
        let days = days_remaining(&sub, today);
        let message = format!(
            "📄 <b>Your hosting service</b>\n\
             🏢 Provider: {}\n\
             🌐 Domain: {}\n\
             🛠 Service: {}\n\
             📅 Expires: {} ({})\n\
             💰 Price: {}\n\
             📌 Status: {}",
            sub.provider,
            sub.domain,
            sub.service_type,
            expiration,
            countdown_text(days),
            format_price(sub.price_sell),
            status_label(&sub, today).as_text(),
        );
        let request = bot
            .send_message(chat_id, message)
            .parse_mode(ParseMode::Html);
        if sub.is_approved() {
            request.await?;
        } else {
            let markup = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
                "💳 Pay now",
                Callback::PayNow(sub.id).encode(),
            )]]);
            request.reply_markup(markup).await?;
        }
    }
    Ok(())
}

/// Store the uploaded proof against the subscription awaiting it and fan the
/// photo out to every admin with approve/reject buttons.
async fn handle_payment_proof(
    msg: &Message,
    bot: &Bot,
    pool: &PgPool,
    config: &Config,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let proof_ref = match msg.photo().and_then(|p| p.last()) {
        Some(photo) => photo.file.id.to_string(),
        None => return Ok(()),
    };

    let sub = match db::attach_payment_proof(pool, chat_id.0, &proof_ref).await {
        Ok(sub) => sub,
        Err(e @ BotError::NoPendingPayment) => {
            bot.send_message(chat_id, e.user_message()).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        "payment proof from user_id={} for subscription {} ({})",
        chat_id.0, sub.id, sub.domain
    );
    bot.send_message(
        chat_id,
        "✅ Transfer proof received. An admin will review your payment.",
    )
    .await?;

    let sender = msg
        .from
        .as_ref()
        .map(|u| {
            let handle = u
                .username
                .as_deref()
                .map(|n| format!("@{}", n))
                .unwrap_or_else(|| "-".to_string());
            format!("{} ({})", u.full_name(), handle)
        })
        .unwrap_or_else(|| "-".to_string());
    let caption = format!(
        "📢 <b>Payment received</b>\n\n\
         🌐 Domain: <b>{}</b>\n\
         🏢 Provider: <code>{}</code>\n\
         💰 Price: <b>{}</b>\n\
         👤 From: {}\n\
         📌 user_id: {}",
        sub.domain,
        sub.provider,
        format_price(sub.price_sell),
        sender,
        sub.client_user_id
    );
    let markup = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Approve", Callback::Approve(sub.id).encode()),
        InlineKeyboardButton::callback("❌ Reject", Callback::Reject(sub.id).encode()),
    ]]);
    notify::broadcast_photo(bot, &config.admin_ids, &proof_ref, &caption, &markup).await;
    Ok(())
}

pub async fn handle_callback_query(
    q: CallbackQuery,
    bot: Bot,
    msg: Message,
    pool: PgPool,
    config: Arc<Config>,
    user_sessions: &mut HashMap<i64, UserSession>,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let callback = match q.data.as_deref().and_then(Callback::parse) {
        Some(cb) => cb,
        None => {
            bot.answer_callback_query(q.id).await?;
            return Ok(());
        }
    };
    bot.answer_callback_query(q.id).await?;

    let session = user_sessions
        .entry(chat_id.0)
        .or_insert_with(UserSession::new);

    // Pay Now is the one client-side button; everything below is admin-only.
    if let Callback::PayNow(id) = callback {
        return handle_pay_now(&bot, &pool, chat_id, id).await;
    }

    if !config.is_admin(chat_id.0) {
        warn!("admin callback denied for user_id={}", chat_id.0);
        bot.edit_message_text(chat_id, msg.id, "❌ Access denied.")
            .await?;
        return Ok(());
    }

    match callback {
        Callback::BackToMenu => {
            session.reset();
            bot.edit_message_text(chat_id, msg.id, "🔧 <b>Admin menu</b>")
                .parse_mode(ParseMode::Html)
                .reply_markup(admin_menu_keyboard())
                .await?;
        }
        Callback::AdminAdd => {
            let clients = db::list_clients(&pool).await?;
            if clients.is_empty() {
                bot.edit_message_text(chat_id, msg.id, "⚠️ Nobody has pressed /start yet.")
                    .reply_markup(back_button())
                    .await?;
                return Ok(());
            }
            let hosted = db::hosted_client_ids(&pool).await?;
            let mut rows: Vec<Vec<InlineKeyboardButton>> = clients
                .iter()
                .map(|c| {
                    let mark = if hosted.contains(&c.user_id) { "✅ " } else { "" };
                    vec![InlineKeyboardButton::callback(
                        format!("{}{}", mark, c.full_name),
                        Callback::ChooseClient(c.user_id).encode(),
                    )]
                })
                .collect();
            rows.push(vec![InlineKeyboardButton::callback(
                "⬅️ Back to menu",
                Callback::BackToMenu.encode(),
            )]);
            session.reset();
            session.step = UserStep::AddChoosingClient;
            bot.edit_message_text(chat_id, msg.id, "Pick the client to add a subscription for:")
                .reply_markup(InlineKeyboardMarkup::new(rows))
                .await?;
        }
        Callback::ChooseClient(client_id) => {
            if session.step != UserStep::AddChoosingClient {
                return Ok(());
            }
            session.add.client_user_id = Some(client_id);
            session.step = UserStep::AddProvider;
            bot.edit_message_text(chat_id, msg.id, "Enter the provider (e.g. rumahweb):")
                .reply_markup(back_button())
                .await?;
        }
        Callback::ChooseServiceType(raw) => {
            let service_type = match ServiceType::parse(&raw) {
                Some(st) => st,
                None => return Ok(()),
            };
            match session.step {
                UserStep::AddServiceType => {
                    session.add.service_type = Some(service_type);
                    session.step = UserStep::AddRentalDate;
                    bot.edit_message_text(
                        chat_id,
                        msg.id,
                        "Enter the rental date (YYYY-MM-DD):",
                    )
                    .reply_markup(back_button())
                    .await?;
                }
                UserStep::EditEnteringValue => {
                    apply_field_edit(&bot, &pool, chat_id, session, service_type.as_str())
                        .await?;
                }
                _ => {}
            }
        }
        Callback::AdminList => {
            let subs = db::list_active(&pool).await?;
            if subs.is_empty() {
                bot.edit_message_text(chat_id, msg.id, "⚠️ No subscriptions yet.")
                    .reply_markup(back_button())
                    .await?;
                return Ok(());
            }
            let months = lifecycle::expiration_months(&subs);
            let mut rows: Vec<Vec<InlineKeyboardButton>> = months
                .iter()
                .map(|m| {
                    let count = subs
                        .iter()
                        .filter(|s| {
                            effective_expiration(s).format("%Y-%m").to_string() == *m
                        })
                        .count();
                    vec![InlineKeyboardButton::callback(
                        format!("{} ({})", m, count),
                        Callback::FilterMonth(Some(m.clone())).encode(),
                    )]
                })
                .collect();
            rows.push(vec![InlineKeyboardButton::callback(
                "📋 Show all",
                Callback::FilterMonth(None).encode(),
            )]);
            rows.push(vec![InlineKeyboardButton::callback(
                "⬅️ Back to menu",
                Callback::BackToMenu.encode(),
            )]);
            bot.edit_message_text(chat_id, msg.id, "Filter by expiration month:")
                .reply_markup(InlineKeyboardMarkup::new(rows))
                .await?;
        }
        Callback::FilterMonth(month) => {
            let subs = db::list_active(&pool).await?;
            let filtered = match &month {
                Some(m) => {
                    let (start, end) = lifecycle::month_bounds(m)?;
                    subs.into_iter()
                        .filter(|s| {
                            let exp = effective_expiration(s);
                            exp >= start && exp < end
                        })
                        .collect()
                }
                None => subs,
            };
            session.list = ListState {
                month,
                page: 0,
                items: filtered,
            };
            send_list_page(&bot, &pool, chat_id, msg.id, session).await?;
        }
        Callback::PagePrev => {
            session.list.page = session.list.page.saturating_sub(1);
            send_list_page(&bot, &pool, chat_id, msg.id, session).await?;
        }
        Callback::PageNext => {
            let last = session.list.items.len().saturating_sub(1) / ITEMS_PER_PAGE;
            session.list.page = (session.list.page + 1).min(last);
            send_list_page(&bot, &pool, chat_id, msg.id, session).await?;
        }
        Callback::AdminEdit => {
            session.reset();
            session.step = UserStep::EditChoosingSubscription;
            send_subscription_picker(&bot, &pool, chat_id, msg.id, "Pick the subscription to edit:")
                .await?;
        }
        Callback::AdminDelete => {
            session.reset();
            session.step = UserStep::DeleteChoosing;
            send_subscription_picker(
                &bot,
                &pool,
                chat_id,
                msg.id,
                "Pick the subscription to delete:",
            )
            .await?;
        }
        Callback::ChooseSubscription(id) => match session.step {
            UserStep::EditChoosingSubscription => {
                if db::get_subscription(&pool, id).await?.is_none() {
                    session.reset();
                    bot.edit_message_text(chat_id, msg.id, "❌ Record not found.")
                        .reply_markup(back_button())
                        .await?;
                    return Ok(());
                }
                session.edit.subscription_id = Some(id);
                session.step = UserStep::EditChoosingField;
                let mut rows: Vec<Vec<InlineKeyboardButton>> = EditableField::ALL
                    .iter()
                    .map(|f| {
                        vec![InlineKeyboardButton::callback(
                            f.label(),
                            Callback::ChooseField(f.column().to_string()).encode(),
                        )]
                    })
                    .collect();
                rows.push(vec![InlineKeyboardButton::callback(
                    "⬅️ Back to menu",
                    Callback::BackToMenu.encode(),
                )]);
                bot.edit_message_text(chat_id, msg.id, "Pick the field to edit:")
                    .reply_markup(InlineKeyboardMarkup::new(rows))
                    .await?;
            }
            UserStep::DeleteChoosing => {
                session.pending_delete = Some(id);
                session.step = UserStep::DeleteConfirm;
                let markup = InlineKeyboardMarkup::new(vec![
                    vec![InlineKeyboardButton::callback(
                        "✅ Yes, delete",
                        Callback::ConfirmDelete.encode(),
                    )],
                    vec![InlineKeyboardButton::callback(
                        "❌ Cancel",
                        Callback::CancelDelete.encode(),
                    )],
                ]);
                bot.edit_message_text(
                    chat_id,
                    msg.id,
                    "⚠️ Are you sure you want to delete this subscription?",
                )
                .reply_markup(markup)
                .await?;
            }
            _ => {}
        },
        Callback::ChooseField(column) => {
            if session.step != UserStep::EditChoosingField {
                return Ok(());
            }
            let field = match EditableField::from_column(&column) {
                Some(f) => f,
                None => return Ok(()),
            };
            session.edit.field = Some(field);
            session.step = UserStep::EditEnteringValue;
            if field == EditableField::ServiceType {
                bot.edit_message_text(chat_id, msg.id, field.prompt())
                    .reply_markup(service_type_keyboard())
                    .await?;
            } else {
                bot.edit_message_text(chat_id, msg.id, field.prompt())
                    .reply_markup(back_button())
                    .await?;
            }
        }
        Callback::ConfirmDelete => {
            let id = match session.pending_delete.take() {
                Some(id) => id,
                None => {
                    bot.edit_message_text(chat_id, msg.id, "❌ Nothing selected for deletion.")
                        .reply_markup(back_button())
                        .await?;
                    return Ok(());
                }
            };
            session.reset();
            match db::delete_subscription(&pool, id).await {
                Ok(()) => {
                    info!("subscription {} deleted by admin {}", id, chat_id.0);
                    bot.edit_message_text(chat_id, msg.id, "✅ Subscription deleted.")
                        .reply_markup(back_button())
                        .await?;
                }
                Err(e) => {
                    warn!("delete of subscription {} failed: {}", id, e);
                    bot.edit_message_text(chat_id, msg.id, e.user_message())
                        .reply_markup(back_button())
                        .await?;
                }
            }
        }
        Callback::CancelDelete => {
            session.reset();
            bot.edit_message_text(chat_id, msg.id, "❌ Deletion cancelled.")
                .reply_markup(back_button())
                .await?;
        }
        Callback::Approve(id) => {
            let today = Local::now().date_naive();
            match db::approve_subscription(&pool, id, today).await {
                Ok(sub) => {
                    info!(
                        "payment approved for subscription {} ({}), expires {}",
                        sub.id,
                        sub.domain,
                        effective_expiration(&sub)
                    );
                    if let Err(e) = notify::send_text(
                        &bot,
                        sub.client_user_id,
                        "✅ Your payment has been verified. The service stays active.",
                    )
                    .await
                    {
                        warn!("could not notify client {} of approval: {}", sub.client_user_id, e);
                    }
                    edit_admin_verdict(&bot, &msg, "✅ Payment approved.").await;
                }
                Err(e) => {
                    warn!("approve of subscription {} failed: {}", id, e);
                    edit_admin_verdict(&bot, &msg, &e.user_message()).await;
                }
            }
        }
        Callback::Reject(id) => {
            match db::reject_subscription(&pool, id).await {
                Ok(sub) => {
                    info!("payment rejected for subscription {} ({})", sub.id, sub.domain);
                    if let Err(e) = notify::send_text(
                        &bot,
                        sub.client_user_id,
                        "❌ Your payment was rejected. Please resend the transfer proof.",
                    )
                    .await
                    {
                        warn!("could not notify client {} of rejection: {}", sub.client_user_id, e);
                    }
                    edit_admin_verdict(&bot, &msg, "❌ Payment rejected.").await;
                }
                Err(e) => {
                    warn!("reject of subscription {} failed: {}", id, e);
                    edit_admin_verdict(&bot, &msg, &e.user_message()).await;
                }
            }
        }
        Callback::PayNow(_) => unreachable!("handled above"),
    }
    Ok(())
}

/// The verdict replaces the caption under the proof photo; plain messages
/// (e.g. stale buttons) fall back to editing the text.
async fn edit_admin_verdict(bot: &Bot, msg: &Message, verdict: &str) {
    let edited = bot
        .edit_message_caption(msg.chat.id, msg.id)
        .caption(verdict)
        .await;
    if edited.is_err() {
        if let Err(e) = bot.edit_message_text(msg.chat.id, msg.id, verdict).await {
            warn!("could not record verdict on admin message: {}", e);
        }
    }
}

async fn handle_pay_now(bot: &Bot, pool: &PgPool, chat_id: ChatId, id: i64) -> HandlerResult {
    match db::mark_waiting_proof(pool, id).await {
        Ok(sub) => {
            info!(
                "pay-now pressed for subscription {} by user_id={}",
                sub.id, chat_id.0
            );
            bot.send_message(
                chat_id,
                format!(
                    "💳 <b>Payment details</b>\n\n\
                     🌐 Domain: {}\n\
                     💰 Total: {}\n\
                     🏦 Account: 123-456-7890\n\n\
                     Upload the transfer proof here once you have paid.",
                    sub.domain,
                    format_price(sub.price_sell)
                ),
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }
        Err(e) => {
            warn!("pay-now on subscription {} failed: {}", id, e);
            bot.send_message(chat_id, e.user_message()).await?;
        }
    }
    Ok(())
}

async fn send_subscription_picker(
    bot: &Bot,
    pool: &PgPool,
    chat_id: ChatId,
    msg_id: teloxide::types::MessageId,
    prompt: &str,
) -> HandlerResult {
    let subs = db::list_active(pool).await?;
    if subs.is_empty() {
        bot.edit_message_text(chat_id, msg_id, "⚠️ No active subscriptions.")
            .reply_markup(back_button())
            .await?;
        return Ok(());
    }
    let mut rows: Vec<Vec<InlineKeyboardButton>> = subs
        .iter()
        .map(|s| {
            vec![InlineKeyboardButton::callback(
                format!("{} | {} ({})", s.provider, s.domain, s.service_type),
                Callback::ChooseSubscription(s.id).encode(),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "⬅️ Back to menu",
        Callback::BackToMenu.encode(),
    )]);
    bot.edit_message_text(chat_id, msg_id, prompt)
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

async fn send_list_page(
    bot: &Bot,
    pool: &PgPool,
    chat_id: ChatId,
    msg_id: teloxide::types::MessageId,
    session: &mut UserSession,
) -> HandlerResult {
    let state = &session.list;
    if state.items.is_empty() {
        bot.edit_message_text(chat_id, msg_id, "⚠️ No subscriptions match.")
            .reply_markup(back_button())
            .await?;
        return Ok(());
    }

    let start = state.page * ITEMS_PER_PAGE;
    let end = (start + ITEMS_PER_PAGE).min(state.items.len());
    let page_items = &state.items[start..end];

    let clients = db::list_clients(pool).await?;
    let names: HashMap<i64, String> = clients
        .iter()
        .map(|c: &Client| (c.user_id, c.display()))
        .collect();

    let header = match &state.month {
        Some(m) => format!("📋 Expiring in {}:\n\n", m),
        None => "📋 All subscriptions:\n\n".to_string(),
    };

    let today = Local::now().date_naive();
    let blocks: Vec<String> = page_items
        .iter()
        .map(|s| {
            format!(
                "🌐 Domain: {}\n\
                 👤 Client: {} ({})\n\
                 🏢 Provider: {}\n\
                 📦 Service: {}\n\
                 📅 Expires: {}\n\
                 💸 Sell price: {}\n\
                 📌 Status: {}",
                s.domain,
                s.client_user_id,
                names.get(&s.client_user_id).map(String::as_str).unwrap_or("-"),
                s.provider,
                s.service_type,
                effective_expiration(s),
                format_price(s.price_sell),
                status_label(s, today).as_text(),
            )
        })
        .collect();

    let mut nav = vec![];
    if state.page > 0 {
        nav.push(InlineKeyboardButton::callback(
            "⬅️ Prev",
            Callback::PagePrev.encode(),
        ));
    }
    if end < state.items.len() {
        nav.push(InlineKeyboardButton::callback(
            "➡️ Next",
            Callback::PageNext.encode(),
        ));
    }
    let mut rows = vec![];
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "⬅️ Back to menu",
        Callback::BackToMenu.encode(),
    )]);

    bot.edit_message_text(chat_id, msg_id, format!("{}{}", header, blocks.join("\n\n")))
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}
