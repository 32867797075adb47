use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::BotError;
use crate::lifecycle::{add_one_month, EditableField, FieldValue};
use crate::models::{Client, NewSubscription, Subscription};

pub async fn get_db_pool(database_url: &str) -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .expect("Failed to connect to DB");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// One bounded retry for read queries; transient pool/network hiccups get a
/// second chance, everything else surfaces as-is.
async fn with_retry<T, F, Fut>(op: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    match op().await {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!("store read failed, retrying once: {}", e);
            tokio::time::sleep(Duration::from_millis(200)).await;
            op().await
        }
    }
}

// ---------------------------------------------------------------- clients

/// Insert the client on first contact, refresh name/handle afterwards.
pub async fn ensure_client(
    pool: &PgPool,
    user_id: i64,
    full_name: &str,
    username: Option<&str>,
) -> Result<Client, BotError> {
    let client = sqlx::query_as::<_, Client>(
        "INSERT INTO clients (user_id, full_name, username) VALUES ($1, $2, $3)
         ON CONFLICT (user_id)
         DO UPDATE SET full_name = EXCLUDED.full_name, username = EXCLUDED.username
         RETURNING user_id, full_name, username",
    )
    .bind(user_id)
    .bind(full_name)
    .bind(username)
    .fetch_one(pool)
    .await?;
    Ok(client)
}

pub async fn list_clients(pool: &PgPool) -> Result<Vec<Client>, BotError> {
    let clients = with_retry(|| {
        sqlx::query_as::<_, Client>("SELECT * FROM clients ORDER BY full_name").fetch_all(pool)
    })
    .await?;
    Ok(clients)
}

pub async fn get_client(pool: &PgPool, user_id: i64) -> Result<Option<Client>, BotError> {
    let client = with_retry(|| {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
    })
    .await?;
    Ok(client)
}

/// Clients that already own at least one active subscription.
pub async fn hosted_client_ids(pool: &PgPool) -> Result<Vec<i64>, BotError> {
    let ids = with_retry(|| {
        sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT client_user_id FROM subscriptions WHERE status = 'active'",
        )
        .fetch_all(pool)
    })
    .await?;
    Ok(ids)
}

// ---------------------------------------------------------- subscriptions

pub async fn insert_subscription(
    pool: &PgPool,
    new: &NewSubscription,
) -> Result<Subscription, BotError> {
    let sub = sqlx::query_as::<_, Subscription>(
        "INSERT INTO subscriptions
           (client_user_id, provider, domain, service_type, rental_date,
            expiration_date, price_buy, price_sell, status, payment_status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', 'pending')
         RETURNING *",
    )
    .bind(new.client_user_id)
    .bind(&new.provider)
    .bind(&new.domain)
    .bind(&new.service_type)
    .bind(new.rental_date)
    .bind(new.expiration_date)
    .bind(new.price_buy)
    .bind(new.price_sell)
    .fetch_one(pool)
    .await?;
    Ok(sub)
}

pub async fn get_subscription(pool: &PgPool, id: i64) -> Result<Option<Subscription>, BotError> {
    let sub = with_retry(|| {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .fetch_optional(pool)
    })
    .await?;
    Ok(sub)
}

pub async fn list_active(pool: &PgPool) -> Result<Vec<Subscription>, BotError> {
    let subs = with_retry(|| {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE status = 'active'
             ORDER BY COALESCE(expiration_date, rental_date), id",
        )
        .fetch_all(pool)
    })
    .await?;
    Ok(subs)
}

/// The scanner's working set: active and not yet approved for this cycle.
pub async fn list_active_unapproved(pool: &PgPool) -> Result<Vec<Subscription>, BotError> {
    let subs = with_retry(|| {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions
             WHERE status = 'active' AND payment_status <> 'approved'
             ORDER BY COALESCE(expiration_date, rental_date), id",
        )
        .fetch_all(pool)
    })
    .await?;
    Ok(subs)
}

pub async fn list_by_client(
    pool: &PgPool,
    client_user_id: i64,
) -> Result<Vec<Subscription>, BotError> {
    let subs = with_retry(|| {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions
             WHERE client_user_id = $1 AND status = 'active'
             ORDER BY id",
        )
        .bind(client_user_id)
        .fetch_all(pool)
    })
    .await?;
    Ok(subs)
}

/// Single-field patch. The column name comes from the closed field enum, the
/// value was already validated.
pub async fn update_field(
    pool: &PgPool,
    id: i64,
    field: EditableField,
    value: &FieldValue,
) -> Result<(), BotError> {
    let sql = format!(
        "UPDATE subscriptions SET {} = $1 WHERE id = $2 AND status = 'active' RETURNING id",
        field.column()
    );
    let query = sqlx::query_scalar::<_, i64>(&sql);
    let query = match value {
        FieldValue::Text(s) => query.bind(s.clone()),
        FieldValue::Date(d) => query.bind(*d),
        FieldValue::OptionalDate(d) => query.bind(*d),
        FieldValue::Money(m) => query.bind(*m),
        FieldValue::OptionalText(t) => query.bind(t.clone()),
    };
    let updated = query.bind(id).fetch_optional(pool).await?;
    match updated {
        Some(_) => Ok(()),
        None => Err(BotError::NotFound(id)),
    }
}

/// Pay-Now: durably mark the subscription as expecting a transfer proof.
pub async fn mark_waiting_proof(pool: &PgPool, id: i64) -> Result<Subscription, BotError> {
    sqlx::query_as::<_, Subscription>(
        "UPDATE subscriptions SET waiting_payment_proof = TRUE
         WHERE id = $1 AND status = 'active'
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(BotError::NotFound(id))
}

/// Attach an uploaded proof to the sender's subscription that is awaiting
/// one. With several flagged rows the most recently created wins.
pub async fn attach_payment_proof(
    pool: &PgPool,
    client_user_id: i64,
    proof_ref: &str,
) -> Result<Subscription, BotError> {
    sqlx::query_as::<_, Subscription>(
        "UPDATE subscriptions
         SET payment_proof_ref = $2, payment_status = 'pending'
         WHERE id = (
             SELECT id FROM subscriptions
             WHERE client_user_id = $1 AND status = 'active'
               AND waiting_payment_proof = TRUE
             ORDER BY id DESC LIMIT 1
         )
         RETURNING *",
    )
    .bind(client_user_id)
    .bind(proof_ref)
    .fetch_optional(pool)
    .await?
    .ok_or(BotError::NoPendingPayment)
}

/// Approve a payment. The compare-and-swap on payment_status guarantees that
/// of two concurrent approvals exactly one wins; the loser mutates nothing.
pub async fn approve_subscription(
    pool: &PgPool,
    id: i64,
    today: NaiveDate,
) -> Result<Subscription, BotError> {
    let new_expiration = add_one_month(today);
    let approved = sqlx::query_as::<_, Subscription>(
        "UPDATE subscriptions
         SET payment_status = 'approved', waiting_payment_proof = FALSE,
             approved_date = $2, expiration_date = $3
         WHERE id = $1 AND status = 'active' AND payment_status <> 'approved'
         RETURNING *",
    )
    .bind(id)
    .bind(today)
    .bind(new_expiration)
    .fetch_optional(pool)
    .await?;
    match approved {
        Some(sub) => Ok(sub),
        None => {
            let current = get_subscription(pool, id).await?;
            Err(approve_conflict(id, current.as_ref()))
        }
    }
}

/// Interprets a zero-row approve from the re-read record: an approved row
/// means this caller lost the race, anything else means the id is gone.
/// Either way the losing call mutates nothing.
fn approve_conflict(id: i64, current: Option<&Subscription>) -> BotError {
    match current {
        Some(sub) if sub.is_approved() => BotError::AlreadyApproved(id),
        _ => BotError::NotFound(id),
    }
}

pub async fn reject_subscription(pool: &PgPool, id: i64) -> Result<Subscription, BotError> {
    sqlx::query_as::<_, Subscription>(
        "UPDATE subscriptions
         SET payment_status = 'rejected', waiting_payment_proof = TRUE,
             payment_proof_ref = NULL
         WHERE id = $1 AND status = 'active'
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(BotError::NotFound(id))
}

/// Monthly rollover: reopen the billing cycle of every approved subscription.
/// approved_date and expiration_date are deliberately left untouched.
pub async fn reset_monthly(pool: &PgPool) -> Result<u64, BotError> {
    let result = sqlx::query(
        "UPDATE subscriptions
         SET payment_status = 'pending', waiting_payment_proof = TRUE,
             payment_proof_ref = NULL
         WHERE status = 'active' AND payment_status = 'approved'",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_subscription(pool: &PgPool, id: i64) -> Result<(), BotError> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(BotError::NotFound(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;

    fn row(payment_status: PaymentStatus) -> Subscription {
        Subscription {
            id: 7,
            client_user_id: 100,
            provider: "rumahweb".into(),
            domain: "example.com".into(),
            service_type: "hosting".into(),
            rental_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            expiration_date: Some(NaiveDate::from_ymd_opt(2025, 2, 10).unwrap()),
            price_buy: 100_000,
            price_sell: 200_000,
            status: "active".into(),
            payment_status: payment_status.as_str().into(),
            approved_date: None,
            waiting_payment_proof: false,
            payment_proof_ref: None,
            notes: None,
        }
    }

    #[test]
    fn second_approver_sees_already_approved() {
        let sub = row(PaymentStatus::Approved);
        assert!(matches!(
            approve_conflict(7, Some(&sub)),
            BotError::AlreadyApproved(7)
        ));
    }

    #[test]
    fn approving_a_missing_id_is_not_found() {
        assert!(matches!(approve_conflict(7, None), BotError::NotFound(7)));
    }

    #[test]
    fn unapproved_readback_after_a_miss_is_not_found() {
        // A miss with a pending readback means the row changed between the
        // update and the re-read; the caller gets the conservative outcome.
        let sub = row(PaymentStatus::Pending);
        assert!(matches!(approve_conflict(7, Some(&sub)), BotError::NotFound(7)));
    }
}
