use thiserror::Error;

use crate::msisdn::MsisdnError;

/// Failures rejected at the webhook boundary, before any tenant lookup.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EdgeError {
    #[error("webhook signature verification failed")]
    BadSignature,
    #[error("webhook verification handshake rejected")]
    HandshakeRejected,
    #[error(transparent)]
    Identity(#[from] MsisdnError),
}

/// Failures inside a dialog turn. Access and feature denials are not errors
/// (they are routed outcomes with their own messages); validation failures
/// re-prompt in place. What remains is infrastructure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("dialog session was modified concurrently")]
    StaleSession,
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl TurnError {
    /// The message shown to the sender when a turn fails. Never leaks the
    /// underlying cause; the cause is logged with tenant and state context.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::StaleSession => {
                "That reply crossed with another update. Please send your last message again."
            }
            Self::Persistence(_) => {
                "Something went wrong saving that. Nothing was lost - please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TurnError;

    #[test]
    fn user_messages_do_not_leak_internal_detail() {
        let error = TurnError::Persistence("database is locked (code 5)".to_owned());
        assert!(!error.user_message().contains("database"));
        assert!(!error.user_message().contains("code 5"));
    }
}
