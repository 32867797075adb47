use thiserror::Error;

/// Typed outcomes of lifecycle transitions. Recoverable variants carry a
/// user-visible message; nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("subscription {0} not found")]
    NotFound(i64),

    #[error("no subscription is awaiting a payment proof")]
    NoPendingPayment,

    #[error("subscription {0} is already approved")]
    AlreadyApproved(i64),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("delivery failed: {0}")]
    Delivery(#[from] teloxide::RequestError),
}

impl BotError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BotError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Message shown to the user who triggered the failing flow.
    pub fn user_message(&self) -> String {
        match self {
            BotError::Validation { message, .. } => format!("⚠️ {}", message),
            BotError::NotFound(_) => "❌ Record not found.".to_string(),
            BotError::NoPendingPayment => {
                "⚠️ No payment is awaiting a transfer proof right now.".to_string()
            }
            BotError::AlreadyApproved(_) => "⚠️ This payment was already approved.".to_string(),
            BotError::Store(_) | BotError::Delivery(_) => {
                "❌ Something went wrong. Please try again later.".to_string()
            }
        }
    }
}
