use sqlx::FromRow;
use chrono::NaiveDate;

#[derive(Debug, Clone, FromRow)]
pub struct Client {
    pub user_id: i64,
    pub full_name: String,
    pub username: Option<String>,
}

impl Client {
    /// Preferred display handle: @username when set, full name otherwise.
    pub fn display(&self) -> String {
        match self.username.as_deref() {
            Some(u) if !u.trim().is_empty() && u != "-" => format!("@{}", u),
            _ => self.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub client_user_id: i64,
    pub provider: String,
    pub domain: String,
    pub service_type: String,
    pub rental_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub price_buy: i64,
    pub price_sell: i64,
    pub status: String,
    pub payment_status: String,
    pub approved_date: Option<NaiveDate>,
    pub waiting_payment_proof: bool,
    pub payment_proof_ref: Option<String>,
    pub notes: Option<String>,
}

impl Subscription {
    pub fn is_approved(&self) -> bool {
        self.payment_status == PaymentStatus::Approved.as_str()
    }
}

/// A fully validated creation form, written in one insert at completion.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub client_user_id: i64,
    pub provider: String,
    pub domain: String,
    pub service_type: String,
    pub rental_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub price_buy: i64,
    pub price_sell: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Hosting,
    Domain,
    Vps,
    Email,
}

impl ServiceType {
    pub const ALL: [ServiceType; 4] = [
        ServiceType::Hosting,
        ServiceType::Domain,
        ServiceType::Vps,
        ServiceType::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Hosting => "hosting",
            ServiceType::Domain => "domain",
            ServiceType::Vps => "vps",
            ServiceType::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<ServiceType> {
        match s.to_ascii_lowercase().as_str() {
            "hosting" => Some(ServiceType::Hosting),
            "domain" => Some(ServiceType::Domain),
            "vps" => Some(ServiceType::Vps),
            "email" => Some(ServiceType::Email),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Deleted,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Deleted => "deleted",
        }
    }
}

/// Thousands-separated price for messages, e.g. 1250000 -> "1,250,000".
pub fn format_price(value: i64) -> String {
    let digits = value.abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_prices_with_separators() {
        assert_eq!(format_price(0), "0");
        assert_eq!(format_price(950), "950");
        assert_eq!(format_price(100_000), "100,000");
        assert_eq!(format_price(1_250_000), "1,250,000");
    }

    #[test]
    fn service_type_round_trip() {
        for st in ServiceType::ALL {
            assert_eq!(ServiceType::parse(st.as_str()), Some(st));
        }
        assert_eq!(ServiceType::parse("VPS"), Some(ServiceType::Vps));
        assert_eq!(ServiceType::parse("cloud"), None);
    }

    #[test]
    fn client_display_prefers_username() {
        let c = Client {
            user_id: 1,
            full_name: "Jane Roe".into(),
            username: Some("jroe".into()),
        };
        assert_eq!(c.display(), "@jroe");
        let no_handle = Client {
            user_id: 2,
            full_name: "John Doe".into(),
            username: None,
        };
        assert_eq!(no_handle.display(), "John Doe");
    }
}
