use async_trait::async_trait;
use thiserror::Error;

use karani_core::dialog::outbound::OutboundPlan;
use karani_core::msisdn::Msisdn;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("transport rejected the message: status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound side of one transport. Implementations translate the plan into
/// whatever the transport natively supports; failures are for the caller to
/// log, never to propagate into a webhook acknowledgement.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &Msisdn, plan: &OutboundPlan) -> Result<(), SendError>;
}
