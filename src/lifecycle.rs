//! The subscription lifecycle rules: effective expiration, countdown labels,
//! the reminder window and field validation. Every consumer that displays or
//! reasons about expiration goes through this module, so the rollover
//! arithmetic exists exactly once.

use chrono::{Datelike, Days, NaiveDate};

use crate::error::BotError;
use crate::models::{ServiceType, Subscription};

/// Reminders fire when this many days (or fewer) remain, down to zero.
pub const REMINDER_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Paid,
    Expired,
    DueSoon,
    Active,
}

impl StatusLabel {
    pub fn as_text(&self) -> &'static str {
        match self {
            StatusLabel::Paid => "✅ Paid",
            StatusLabel::Expired => "❌ Expired",
            StatusLabel::DueSoon => "⚠️ Due soon",
            StatusLabel::Active => "✅ Active",
        }
    }
}

/// Same day next month, clamped to the last valid day of the target month
/// (Jan 31 -> Feb 28/29).
pub fn add_one_month(date: NaiveDate) -> NaiveDate {
    let (mut year, mut month) = (date.year(), date.month() + 1);
    if month > 12 {
        month = 1;
        year += 1;
    }
    let mut day = date.day();
    loop {
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return d;
        }
        day -= 1;
    }
}

/// The expiration date actually used for countdown and labeling. An approved
/// payment re-anchors it to one month past the approval date; otherwise the
/// stored expiration applies, falling back to the contract start.
pub fn effective_expiration(sub: &Subscription) -> NaiveDate {
    if sub.is_approved() {
        if let Some(approved) = sub.approved_date {
            return add_one_month(approved);
        }
    }
    sub.expiration_date.unwrap_or(sub.rental_date)
}

pub fn days_remaining(sub: &Subscription, today: NaiveDate) -> i64 {
    (effective_expiration(sub) - today).num_days()
}

pub fn status_label(sub: &Subscription, today: NaiveDate) -> StatusLabel {
    if sub.is_approved() {
        return StatusLabel::Paid;
    }
    let days = days_remaining(sub, today);
    if days < 0 {
        StatusLabel::Expired
    } else if days <= REMINDER_WINDOW_DAYS {
        StatusLabel::DueSoon
    } else {
        StatusLabel::Active
    }
}

/// True iff a reminder is due at this countdown value.
pub fn needs_reminder(days_remaining: i64) -> bool {
    (0..=REMINDER_WINDOW_DAYS).contains(&days_remaining)
}

pub fn countdown_text(days: i64) -> String {
    if days > 1 {
        format!("{} days left", days)
    } else if days == 1 {
        "1 day left".to_string()
    } else if days == 0 {
        "due today".to_string()
    } else if days == -1 {
        "1 day overdue".to_string()
    } else {
        format!("{} days overdue", -days)
    }
}

/// Editable subscription fields and their validated patch values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditableField {
    Provider,
    Domain,
    ServiceType,
    RentalDate,
    ExpirationDate,
    PriceBuy,
    PriceSell,
    Notes,
}

impl EditableField {
    pub const ALL: [EditableField; 8] = [
        EditableField::Provider,
        EditableField::Domain,
        EditableField::ServiceType,
        EditableField::RentalDate,
        EditableField::ExpirationDate,
        EditableField::PriceBuy,
        EditableField::PriceSell,
        EditableField::Notes,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            EditableField::Provider => "provider",
            EditableField::Domain => "domain",
            EditableField::ServiceType => "service_type",
            EditableField::RentalDate => "rental_date",
            EditableField::ExpirationDate => "expiration_date",
            EditableField::PriceBuy => "price_buy",
            EditableField::PriceSell => "price_sell",
            EditableField::Notes => "notes",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EditableField::Provider => "Provider",
            EditableField::Domain => "Domain",
            EditableField::ServiceType => "Service type",
            EditableField::RentalDate => "Rental date",
            EditableField::ExpirationDate => "Expiration date",
            EditableField::PriceBuy => "Buy price",
            EditableField::PriceSell => "Sell price",
            EditableField::Notes => "Notes",
        }
    }

    pub fn from_column(s: &str) -> Option<EditableField> {
        EditableField::ALL.iter().copied().find(|f| f.column() == s)
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            EditableField::Provider => "Enter the new provider (e.g. rumahweb):",
            EditableField::Domain => "Enter the new domain:",
            EditableField::ServiceType => "Pick the new service type:",
            EditableField::RentalDate => "Enter the new rental date (YYYY-MM-DD):",
            EditableField::ExpirationDate => "Enter the new expiration date (YYYY-MM-DD):",
            EditableField::PriceBuy => "Enter the new buy price (e.g. 100000):",
            EditableField::PriceSell => "Enter the new sell price (e.g. 200000):",
            EditableField::Notes => "Enter the new notes ('-' to clear):",
        }
    }
}

/// A validated single-field patch value, ready to bind into an UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    OptionalDate(Option<NaiveDate>),
    Money(i64),
    OptionalText(Option<String>),
}

/// Per-field validation of raw user input. Invalid input yields a
/// field-specific message and no patch; the form re-prompts the same step.
pub fn validate_field(field: EditableField, raw: &str) -> Result<FieldValue, BotError> {
    let raw = raw.trim();
    match field {
        EditableField::Provider | EditableField::Domain => {
            if raw.is_empty() {
                Err(BotError::validation(
                    field.column(),
                    format!("{} must not be empty.", field.label()),
                ))
            } else {
                Ok(FieldValue::Text(raw.to_string()))
            }
        }
        EditableField::ServiceType => match ServiceType::parse(raw) {
            Some(st) => Ok(FieldValue::Text(st.as_str().to_string())),
            None => Err(BotError::validation(
                "service_type",
                "Service type must be one of: hosting, domain, vps, email.",
            )),
        },
        EditableField::RentalDate => parse_date(raw, "rental_date").map(FieldValue::Date),
        EditableField::ExpirationDate => {
            if raw == "-" {
                Ok(FieldValue::OptionalDate(None))
            } else {
                parse_date(raw, "expiration_date").map(|d| FieldValue::OptionalDate(Some(d)))
            }
        }
        EditableField::PriceBuy | EditableField::PriceSell => match raw.parse::<i64>() {
            Ok(v) if v >= 0 => Ok(FieldValue::Money(v)),
            _ => Err(BotError::validation(
                field.column(),
                "Enter a non-negative whole number (e.g. 100000).",
            )),
        },
        EditableField::Notes => {
            if raw == "-" {
                Ok(FieldValue::OptionalText(None))
            } else {
                Ok(FieldValue::OptionalText(Some(raw.to_string())))
            }
        }
    }
}

pub fn parse_date(raw: &str, field: &'static str) -> Result<NaiveDate, BotError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        BotError::validation(field, "Wrong date format. Example: 2025-12-01")
    })
}

///// Soft check used when entering dates: dates in the past are accepted but
/// flagged so the form can warn without blocking.
pub fn is_past(date: NaiveDate, today: NaiveDate) -> bool {
    date < today
}

/// Soft check for a date edit against the record's other date: a rental date
/// after the stored expiration, or an expiration before the rental date, is
/// accepted but flagged.
pub fn breaks_date_order(field: EditableField, new: NaiveDate, sub: &Subscription) -> bool {
    match field {
        EditableField::RentalDate => sub.expiration_date.map_or(false, |exp| new > exp),
        EditableField::ExpirationDate => new < sub.rental_date,
        _ => false,
    }
}

/// The months (YYYY-MM) a scan should offer as expiration filters, distinct
/// and sorted.
pub fn expiration_months(subs: &[Subscription]) -> Vec<String> {
    let mut months: Vec<String> = subs
        .iter()
        .map(|s| effective_expiration(s).format("%Y-%m").to_string())
        .collect();
    months.sort();
    months.dedup();
    months
}

/// First and first-of-next-month bounds for a YYYY-MM filter.
pub fn month_bounds(month: &str) -> Result<(NaiveDate, NaiveDate), BotError> {
    let start = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
        .map_err(|_| BotError::validation("month", "Wrong month format. Example: 2025-12"))?;
    // Jumping 31 days from the 1st always lands in the next month.
    let end = start
        .checked_add_days(Days::new(31))
        .and_then(|d| NaiveDate::from_ymd_opt(d.year(), d.month(), 1))
        .ok_or_else(|| BotError::validation("month", "Month out of range."))?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample(payment_status: PaymentStatus) -> Subscription {
        Subscription {
            id: 1,
            client_user_id: 100,
            provider: "rumahweb".into(),
            domain: "example.com".into(),
            service_type: "hosting".into(),
            rental_date: date(2025, 1, 10),
            expiration_date: None,
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
    fn one_month_forward_keeps_day() {
        assert_eq!(add_one_month(date(2025, 1, 10)), date(2025, 2, 10));
        assert_eq!(add_one_month(date(2025, 12, 5)), date(2026, 1, 5));
    }

    #[test]
    fn one_month_forward_clamps_to_short_months() {
        assert_eq!(add_one_month(date(2025, 1, 31)), date(2025, 2, 28));
        assert_eq!(add_one_month(date(2024, 1, 31)), date(2024, 2, 29));
        assert_eq!(add_one_month(date(2025, 3, 31)), date(2025, 4, 30));
        assert_eq!(add_one_month(date(2025, 8, 31)), date(2025, 9, 30));
    }

    #[test]
    fn unapproved_expiration_falls_back_to_rental_date() {
        let sub = sample(PaymentStatus::Pending);
        assert_eq!(effective_expiration(&sub), date(2025, 1, 10));

        let mut with_expiry = sample(PaymentStatus::Pending);
        with_expiry.expiration_date = Some(date(2025, 6, 1));
        assert_eq!(effective_expiration(&with_expiry), date(2025, 6, 1));
    }

    #[test]
    fn approval_anchors_expiration_to_approved_date() {
        let mut sub = sample(PaymentStatus::Approved);
        sub.approved_date = Some(date(2025, 1, 31));
        sub.expiration_date = Some(date(2025, 1, 10));
        assert_eq!(effective_expiration(&sub), date(2025, 2, 28));
    }

    #[test]
    fn approved_without_date_falls_back_to_stored_expiration() {
        let mut sub = sample(PaymentStatus::Approved);
        sub.expiration_date = Some(date(2025, 3, 1));
        assert_eq!(effective_expiration(&sub), date(2025, 3, 1));
    }

    #[test]
    fn reminder_window_boundaries() {
        assert!(needs_reminder(0));
        assert!(needs_reminder(1));
        assert!(needs_reminder(2));
        assert!(needs_reminder(3));
        assert!(!needs_reminder(4));
        assert!(!needs_reminder(-1));
    }

    #[test]
    fn labels_follow_countdown() {
        let sub = sample(PaymentStatus::Pending);
        // rental_date 2025-01-10, no expiration_date
        assert_eq!(status_label(&sub, date(2025, 1, 6)), StatusLabel::Active);
        assert_eq!(status_label(&sub, date(2025, 1, 7)), StatusLabel::DueSoon);
        assert_eq!(status_label(&sub, date(2025, 1, 10)), StatusLabel::DueSoon);
        assert_eq!(status_label(&sub, date(2025, 1, 11)), StatusLabel::Expired);
    }

    #[test]
    fn due_soon_scenario_fires_reminder() {
        // rental_date 2025-01-10, pending, today 2025-01-08 -> 2 days left
        let sub = sample(PaymentStatus::Pending);
        let today = date(2025, 1, 8);
        assert_eq!(days_remaining(&sub, today), 2);
        assert_eq!(status_label(&sub, today), StatusLabel::DueSoon);
        assert!(needs_reminder(days_remaining(&sub, today)));
    }

    #[test]
    fn approved_scenario_is_paid_and_never_reminded() {
        let mut sub = sample(PaymentStatus::Approved);
        sub.approved_date = Some(date(2025, 1, 10));
        sub.expiration_date = Some(date(2025, 2, 10));
        assert_eq!(effective_expiration(&sub), date(2025, 2, 10));
        assert_eq!(status_label(&sub, date(2025, 2, 10)), StatusLabel::Paid);
        assert_eq!(status_label(&sub, date(2025, 6, 1)), StatusLabel::Paid);
    }

    #[test]
    fn validates_service_type() {
        assert_eq!(
            validate_field(EditableField::ServiceType, "VPS").unwrap(),
            FieldValue::Text("vps".into())
        );
        assert!(validate_field(EditableField::ServiceType, "cloud").is_err());
    }

    #[test]
    fn validates_dates() {
        assert_eq!(
            validate_field(EditableField::RentalDate, "2025-12-01").unwrap(),
            FieldValue::Date(date(2025, 12, 1))
        );
        assert!(validate_field(EditableField::RentalDate, "01-12-2025").is_err());
        assert_eq!(
            validate_field(EditableField::ExpirationDate, "-").unwrap(),
            FieldValue::OptionalDate(None)
        );
    }

    #[test]
    fn validates_prices() {
        assert_eq!(
            validate_field(EditableField::PriceBuy, "100000").unwrap(),
            FieldValue::Money(100_000)
        );
        assert!(validate_field(EditableField::PriceBuy, "-5").is_err());
        assert!(validate_field(EditableField::PriceSell, "12.50").is_err());
    }

    #[test]
    fn notes_dash_clears() {
        assert_eq!(
            validate_field(EditableField::Notes, "-").unwrap(),
            FieldValue::OptionalText(None)
        );
        assert_eq!(
            validate_field(EditableField::Notes, "vip client").unwrap(),
            FieldValue::OptionalText(Some("vip client".into()))
        );
    }

    #[test]
    fn month_bounds_cover_the_month() {
        let (start, end) = month_bounds("2025-01").unwrap();
        assert_eq!(start, date(2025, 1, 1));
        assert_eq!(end, date(2025, 2, 1));
        let (start, end) = month_bounds("2025-12").unwrap();
        assert_eq!(start, date(2025, 12, 1));
        assert_eq!(end, date(2026, 1, 1));
    }

    #[test]
    fn distinct_sorted_expiration_months() {
        let mut a = sample(PaymentStatus::Pending);
        a.expiration_date = Some(date(2025, 3, 5));
        let mut b = sample(PaymentStatus::Pending);
        b.expiration_date = Some(date(2025, 1, 20));
        let mut c = sample(PaymentStatus::Pending);
        c.expiration_date = Some(date(2025, 3, 30));
        assert_eq!(
            expiration_months(&[a, b, c]),
            vec!["2025-01".to_string(), "2025-03".to_string()]
        );
    }

    #[test]
    fn expiration_edit_before_rental_is_flagged() {
        let mut sub = sample(PaymentStatus::Pending);
        sub.expiration_date = Some(date(2025, 2, 10));
        assert!(breaks_date_order(
            EditableField::ExpirationDate,
            date(2025, 1, 1),
            &sub
        ));
        assert!(!breaks_date_order(
            EditableField::ExpirationDate,
            date(2025, 3, 1),
            &sub
        ));
    }

    #[test]
    fn rental_edit_past_stored_expiration_is_flagged() {
        let mut sub = sample(PaymentStatus::Pending);
        sub.expiration_date = Some(date(2025, 2, 10));
        assert!(breaks_date_order(
            EditableField::RentalDate,
            date(2025, 3, 1),
            &sub
        ));
        assert!(!breaks_date_order(
            EditableField::RentalDate,
            date(2025, 2, 1),
            &sub
        ));
    }

    #[test]
    fn date_order_check_ignores_missing_expiration_and_other_fields() {
        let sub = sample(PaymentStatus::Pending);
        assert!(!breaks_date_order(
            EditableField::RentalDate,
            date(2030, 1, 1),
            &sub
        ));
        assert!(!breaks_date_order(
            EditableField::Provider,
            date(2030, 1, 1),
            &sub
        ));
    }
}
