//! Transport collaborator traits.
//!
//! Webhook signature mechanics and SMS delivery are external concerns. The
//! pipeline and scheduler program against these traits; production wires in
//! the real transport, tests wire in recorders.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{SmsError, ValidationError};

/// Transport limit for a single SMS body.
pub const SMS_MAX_LEN: usize = 1600;

/// Inbound webhook payload as handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct InboundSms {
    pub from: String,
    pub body: String,
    pub message_sid: String,
    pub signature: String,
    pub request_url: String,
    pub raw_params: HashMap<String, String>,
}

/// Verifies the transport's request signature.
pub trait SignatureValidator: Send + Sync {
    fn validate(
        &self,
        signature: &str,
        url: &str,
        params: &HashMap<String, String>,
    ) -> Result<(), ValidationError>;
}

/// Outbound SMS dispatch.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send a message. Callers truncate to [`SMS_MAX_LEN`] first.
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

/// Truncate a body to the transport limit on a char boundary.
pub fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(SMS_MAX_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_bodies_alone() {
        assert_eq!(truncate_body("hello"), "hello");
    }

    #[test]
    fn truncate_caps_at_transport_limit() {
        let long = "x".repeat(SMS_MAX_LEN + 100);
        assert_eq!(truncate_body(&long).chars().count(), SMS_MAX_LEN);
    }
}
