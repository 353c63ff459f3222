//! REST history response.

use serde::{Deserialize, Serialize};

use crate::WireMessage;

/// Body of `GET /messages/{chat_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Whether the server handled the request
    pub success: bool,
    /// Human-readable status message
    #[serde(default)]
    pub message: String,
    /// Page of messages; absent on failure
    #[serde(default)]
    pub data: Option<HistoryPage>,
}

/// One page of history, oldest-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Messages, oldest-first
    pub messages: Vec<WireMessage>,
    /// Total message count reported by the server
    #[serde(default)]
    pub count: u64,
}

impl HistoryResponse {
    /// Messages in newest-first order, or `None` when the server reported
    /// failure.
    pub fn into_newest_first(self) -> Option<Vec<WireMessage>> {
        if !self.success {
            return None;
        }
        let mut messages = self.data.map(|page| page.messages).unwrap_or_default();
        messages.reverse();
        Some(messages)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reverses_to_newest_first() {
        let json = r#"{"success":true,"message":"ok","data":{"messages":[
            {"id":1,"chat_id":3,"sender_id":1,"content":"a","created_at":"2024-01-01T00:00:00Z"},
            {"id":2,"chat_id":3,"sender_id":2,"content":"b","created_at":"2024-01-01T00:01:00Z"}
        ],"count":2}}"#;
        let response: HistoryResponse = serde_json::from_str(json).unwrap();
        let ids: Vec<_> = response.into_newest_first().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn unsuccessful_response_yields_none() {
        let response: HistoryResponse =
            serde_json::from_str(r#"{"success":false,"message":"chat not found"}"#).unwrap();
        assert!(response.into_newest_first().is_none());
    }
}
