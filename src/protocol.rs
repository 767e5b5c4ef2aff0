//! Wire protocol between the command client and the daemon.
//!
//! Every message is a single JSON object terminated by `\n`. Requests carry an
//! `action` field naming the command; responses are either an outcome
//! (`{"success":..}`) or, for `get-status`, a status report (`{"active":..}`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::BlockState;

pub const ACTION_PING: &str = "ping";
pub const ACTION_START_BLOCK: &str = "start-block";
pub const ACTION_CLEAR_BLOCK: &str = "clear-block";
pub const ACTION_GET_STATUS: &str = "get-status";

/// Decode failures, rendered with the exact strings sent back on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Missing action")]
    MissingAction,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid {action} request: {reason}")]
    InvalidArguments { action: String, reason: String },
}

/// Arguments of a `start-block` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBlock {
    pub domains: Vec<String>,
    pub end_time: i64,
    pub blocklist_id: String,
}

impl From<StartBlock> for BlockState {
    fn from(req: StartBlock) -> Self {
        BlockState {
            domains: req.domains,
            end_time: req.end_time,
            blocklist_id: req.blocklist_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Request {
    Ping,
    StartBlock(StartBlock),
    ClearBlock,
    GetStatus,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Ping => ACTION_PING,
            Self::StartBlock(_) => ACTION_START_BLOCK,
            Self::ClearBlock => ACTION_CLEAR_BLOCK,
            Self::GetStatus => ACTION_GET_STATUS,
        }
    }

    /// Decode one request line.
    ///
    /// JSON syntax errors, a missing action, unknown actions and bad
    /// arguments for a known action are reported separately so each gets its
    /// own wire error.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line).map_err(|_| ProtocolError::InvalidJson)?;

        let action = match value.get("action") {
            Some(Value::String(action)) => action.clone(),
            _ => return Err(ProtocolError::MissingAction),
        };

        if !matches!(
            action.as_str(),
            ACTION_PING | ACTION_START_BLOCK | ACTION_CLEAR_BLOCK | ACTION_GET_STATUS
        ) {
            return Err(ProtocolError::UnknownCommand(action));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidArguments {
            action,
            reason: e.to_string(),
        })
    }

    /// Encode as a single newline-terminated line.
    pub fn encode(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Result of a mutating command or a ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Outcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            message: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
        }
    }
}

/// Answer to `get-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocklist_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<i64>,
}

impl StatusReport {
    pub fn inactive() -> Self {
        Self {
            active: false,
            domains: None,
            end_time: None,
            blocklist_id: None,
            remaining_ms: None,
        }
    }

    pub fn active(block: &BlockState, now_ms: i64) -> Self {
        Self {
            active: true,
            domains: Some(block.domains.clone()),
            end_time: Some(block.end_time),
            blocklist_id: Some(block.blocklist_id.clone()),
            remaining_ms: Some(block.remaining_ms(now_ms)),
        }
    }
}

/// Any response line. Status reports are tried first since they are the only
/// shape carrying `active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Status(StatusReport),
    Outcome(Outcome),
}

impl Response {
    pub fn encode(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Whether the daemon reported success. Status reports always count as
    /// success since the daemon answered.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Status(_) => true,
            Self::Outcome(outcome) => outcome.success,
        }
    }
}

impl From<Outcome> for Response {
    fn from(outcome: Outcome) -> Self {
        Self::Outcome(outcome)
    }
}

impl From<StatusReport> for Response {
    fn from(report: StatusReport) -> Self {
        Self::Status(report)
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Self::Outcome(Outcome::failure(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple_actions() {
        assert_eq!(Request::decode(r#"{"action":"ping"}"#).unwrap(), Request::Ping);
        assert_eq!(
            Request::decode(r#"{"action":"clear-block"}"#).unwrap(),
            Request::ClearBlock
        );
        assert_eq!(
            Request::decode(r#"{"action":"get-status"}"#).unwrap(),
            Request::GetStatus
        );
    }

    #[test]
    fn test_decode_start_block() {
        let req = Request::decode(
            r#"{"action":"start-block","domains":["x.com","Y.org"],"endTime":1700000000000,"blocklistId":"a"}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::StartBlock(StartBlock {
                domains: vec!["x.com".into(), "Y.org".into()],
                end_time: 1_700_000_000_000,
                blocklist_id: "a".into(),
            })
        );
        assert_eq!(req.action(), "start-block");
    }

    #[test]
    fn test_start_block_into_state_keeps_fields() {
        let block = BlockState::from(StartBlock {
            domains: vec!["https://X.com/feed".into()],
            end_time: 7,
            blocklist_id: "b".into(),
        });
        assert_eq!(block.domains, vec!["https://X.com/feed"]);
        assert_eq!(block.end_time, 7);
        assert_eq!(block.blocklist_id, "b");
    }

    #[test]
    fn test_decode_invalid_json() {
        assert_eq!(Request::decode("{not json"), Err(ProtocolError::InvalidJson));
        assert_eq!(Request::decode(""), Err(ProtocolError::InvalidJson));
    }

    #[test]
    fn test_decode_unknown_command() {
        let err = Request::decode(r#"{"action":"reboot"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: reboot");
    }

    #[test]
    fn test_decode_missing_action() {
        assert_eq!(Request::decode(r#"{"foo":1}"#), Err(ProtocolError::MissingAction));
        assert_eq!(Request::decode(r#"{"action":5}"#), Err(ProtocolError::MissingAction));
        assert_eq!(Request::decode("[1,2]"), Err(ProtocolError::MissingAction));
    }

    #[test]
    fn test_decode_start_block_missing_fields() {
        let err = Request::decode(r#"{"action":"start-block","domains":["x.com"]}"#).unwrap_err();
        match err {
            ProtocolError::InvalidArguments { action, .. } => assert_eq!(action, "start-block"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_encode_request_is_one_line() {
        let line = Request::StartBlock(StartBlock {
            domains: vec!["x.com".into()],
            end_time: 5,
            blocklist_id: "id".into(),
        })
        .encode()
        .unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains(r#""action":"start-block""#));
        assert!(line.contains(r#""endTime":5"#));
        assert!(line.contains(r#""blocklistId":"id""#));
    }

    #[test]
    fn test_outcome_wire_format() {
        assert_eq!(
            Response::from(Outcome::ok()).encode().unwrap(),
            "{\"success\":true}\n"
        );
        assert_eq!(
            Response::from(ProtocolError::InvalidJson).encode().unwrap(),
            "{\"success\":false,\"error\":\"Invalid JSON\"}\n"
        );
    }

    #[test]
    fn test_inactive_status_wire_format() {
        assert_eq!(
            Response::from(StatusReport::inactive()).encode().unwrap(),
            "{\"active\":false}\n"
        );
    }

    #[test]
    fn test_active_status_fields() {
        let block = BlockState {
            domains: vec!["x.com".into()],
            end_time: 10_000,
            blocklist_id: "a".into(),
        };
        let json = serde_json::to_value(Response::from(StatusReport::active(&block, 4_000))).unwrap();
        assert_eq!(json["active"], true);
        assert_eq!(json["domains"][0], "x.com");
        assert_eq!(json["endTime"], 10_000);
        assert_eq!(json["blocklistId"], "a");
        assert_eq!(json["remainingMs"], 6_000);
    }

    #[test]
    fn test_response_decode_picks_shape() {
        match Response::decode(r#"{"active":false}"#).unwrap() {
            Response::Status(report) => assert!(!report.active),
            other => panic!("unexpected: {other:?}"),
        }
        match Response::decode(r#"{"success":false,"error":"boom"}"#).unwrap() {
            Response::Outcome(outcome) => {
                assert!(!outcome.success);
                assert_eq!(outcome.error.as_deref(), Some("boom"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_is_success() {
        assert!(Response::from(StatusReport::inactive()).is_success());
        assert!(!Response::from(Outcome::failure("x")).is_success());
    }
}
