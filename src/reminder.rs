//! The reminder scanner and the monthly rollover, plus the daily scheduling
//! loop that fires both. The scan is stateless between invocations: running
//! it once per day is what keeps reminders at one per (subscription, day).

use chrono::{Datelike, Local, NaiveTime};
use sqlx::PgPool;
use teloxide::prelude::*;

use crate::config::Config;
use crate::lifecycle::{days_remaining, effective_expiration, needs_reminder, countdown_text};
use crate::models::{format_price, Subscription};
use crate::{db, notify};

const SCAN_HOUR: u32 = 9;

/// One scan pass: every active, not-yet-approved subscription inside the
/// reminder window gets one message to its owner and to every admin. A
/// delivery failure only skips that recipient.
pub async fn run_reminder(bot: &Bot, pool: &PgPool, config: &Config) {
    let today = Local::now().date_naive();
    let subs = match db::list_active_unapproved(pool).await {
        Ok(subs) => subs,
        Err(e) => {
            error!("reminder scan aborted, store unavailable: {}", e);
            return;
        }
    };

    let mut sent = 0;
    for sub in &subs {
        let days = days_remaining(sub, today);
        if !needs_reminder(days) {
            continue;
        }
        let message = format_reminder(sub, days);
        if let Err(e) = notify::send_text(bot, sub.client_user_id, &message).await {
            warn!(
                "reminder for {} not delivered to client {}: {}",
                sub.domain, sub.client_user_id, e
            );
        }
        notify::broadcast_text(bot, &config.admin_ids, &message).await;
        sent += 1;
    }
    info!("reminder scan done: {} of {} subscriptions due", sent, subs.len());
}

fn format_reminder(sub: &Subscription, days: i64) -> String {
    format!(
        "⚠️ <b>Payment reminder</b>\n\n\
         🌐 Domain: <b>{}</b>\n\
         🏢 Provider: <code>{}</code>\n\
         💰 Price: <b>{}</b>\n\
         📅 Expires: {} ({})\n\n\
         Please pay before the due date and send the transfer proof here.",
        sub.domain,
        sub.provider,
        format_price(sub.price_sell),
        effective_expiration(sub),
        countdown_text(days)
    )
}

/// Reopen the billing cycle of every approved subscription.
pub async fn run_monthly_rollover(pool: &PgPool) {
    match db::reset_monthly(pool).await {
        Ok(0) => info!("monthly rollover: nothing to reset"),
        Ok(n) => info!("monthly rollover: reopened {} subscriptions", n),
        Err(e) => error!("monthly rollover failed: {}", e),
    }
}

/// Fires the scan once per day at 09:00 local time; on the 1st the rollover
/// runs first so freshly reopened cycles are scanned the same morning.
pub async fn scheduler_loop(bot: Bot, pool: PgPool, config: Config) {
    loop {
        tokio::time::sleep(until_next_scan()).await;
        let today = Local::now().date_naive();
        if today.day() == 1 {
            run_monthly_rollover(&pool).await;
        }
        run_reminder(&bot, &pool, &config).await;
    }
}

fn until_next_scan() -> std::time::Duration {
    let now = Local::now().naive_local();
    let scan_time = NaiveTime::from_hms_opt(SCAN_HOUR, 0, 0).unwrap();
    let mut next = now.date().and_time(scan_time);
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn reminder_message_mentions_domain_and_countdown() {
        let sub = Subscription {
            id: 1,
            client_user_id: 100,
            provider: "rumahweb".into(),
            domain: "example.com".into(),
            service_type: "hosting".into(),
            rental_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            expiration_date: Some(NaiveDate::from_ymd_opt(2025, 1, 12).unwrap()),
            price_buy: 100_000,
            price_sell: 200_000,
            status: "active".into(),
            payment_status: "pending".into(),
            approved_date: None,
            waiting_payment_proof: false,
            payment_proof_ref: None,
            notes: None,
        };
        let msg = format_reminder(&sub, 2);
        assert!(msg.contains("example.com"));
        assert!(msg.contains("2025-01-12"));
        assert!(msg.contains("2 days left"));
        assert!(msg.contains("200,000"));
    }

    #[test]
    fn next_scan_is_within_a_day() {
        let d = until_next_scan();
        assert!(d <= std::time::Duration::from_secs(24 * 60 * 60));
    }
}
