//! Commit Events
//!
//! Events emitted by the commit dispatcher as a transaction moves through the
//! pipeline. Subscribers (UI layer, `wait_for_transaction_applied`) receive
//! them over a tokio broadcast channel.
//!
//! # Event Flow
//!
//! 1. The transaction is applied to the local snapshot: [`CommitEvent::Applied`]
//! 2. The persister stores it: [`CommitEvent::Acknowledged`]
//! 3. Or the persister gives up after its retries: [`CommitEvent::Failed`]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommitEvent {
    /// Applied to the local snapshot, not yet persisted
    #[serde(rename_all = "camelCase")]
    Applied {
        transaction_id: String,
        /// Story re-rendered as a result, when the caller named one
        #[serde(skip_serializing_if = "Option::is_none")]
        story_id: Option<String>,
        version: u64,
        should_reformat: bool,
    },

    /// Persisted by the backend
    #[serde(rename_all = "camelCase")]
    Acknowledged { transaction_id: String },

    /// Persistence gave up; the local snapshot keeps the optimistic state
    #[serde(rename_all = "camelCase")]
    Failed {
        transaction_id: String,
        reason: String,
    },
}

impl CommitEvent {
    pub fn event_type(&self) -> &str {
        match self {
            CommitEvent::Applied { .. } => "transaction:applied",
            CommitEvent::Acknowledged { .. } => "transaction:acknowledged",
            CommitEvent::Failed { .. } => "transaction:failed",
        }
    }

    pub fn transaction_id(&self) -> &str {
        match self {
            CommitEvent::Applied { transaction_id, .. }
            | CommitEvent::Acknowledged { transaction_id }
            | CommitEvent::Failed { transaction_id, .. } => transaction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The UI listener matches on these exact field names.
    #[test]
    fn test_applied_event_serialization_contract() {
        let event = CommitEvent::Applied {
            transaction_id: "tx-1".to_string(),
            story_id: Some("s1".to_string()),
            version: 3,
            should_reformat: true,
        };

        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["type"], "applied");
        assert_eq!(parsed["transactionId"], "tx-1");
        assert_eq!(parsed["storyId"], "s1");
        assert_eq!(parsed["version"], 3);
        assert_eq!(parsed["shouldReformat"], true);
    }

    #[test]
    fn test_failed_event_round_trip() {
        let event = CommitEvent::Failed {
            transaction_id: "tx-2".to_string(),
            reason: "backend unavailable".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: CommitEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back, event);
        assert_eq!(back.event_type(), "transaction:failed");
        assert_eq!(back.transaction_id(), "tx-2");
    }
}
