//! Control-surface messages between a client and the orchestrator
//!
//! Newline-delimited JSON over TCP on localhost (127.0.0.1). One request
//! per line; every request gets exactly one [`ControlResponse`] line,
//! except `stream`, which answers with [`StreamLine`]s until a sentinel.

use serde::{Deserialize, Serialize};

use crate::error::FleetError;
use crate::types::{Credential, HostId, TunnelStatus};

/// Request from a client to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Liveness check
    Ping,

    /// Run host discovery over the configured range
    Discover,

    /// Probe reachability, optionally verifying a credential
    CheckStatus {
        hosts: Vec<HostId>,
        credential: Option<Credential>,
    },

    /// Run a named action and wait for the aggregate result
    Execute(ActionRequest),

    /// Run a named command action and relay its output line by line
    Stream(ActionRequest),

    /// List disabled launchers on a host
    ///
    /// `account` selects whose backup tree is listed; without it the
    /// connected account's own tree is.
    ListBackups {
        host: HostId,
        credential: Credential,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account: Option<String>,
    },

    /// Start a screen-sharing tunnel, replacing any existing one
    StartTunnel { host: HostId, credential: Credential },

    /// Start tunnels to several hosts in parallel
    StartTunnels {
        hosts: Vec<HostId>,
        credential: Credential,
    },

    /// Tear down the tunnel for a host
    StopTunnel { host: HostId },

    /// List registered tunnels
    ListTunnels,

    /// Stop the orchestrator
    Shutdown,
}

/// `{host, credential, actionName, actionPayload}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub host: HostId,
    pub credential: Credential,
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Response to every non-streaming request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    /// HTTP-style status code
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            status: 200,
            message: message.into(),
            details: None,
            data: None,
        }
    }

    /// Success carrying a serializable payload
    pub fn with_data<T: Serialize>(message: impl Into<String>, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                data: Some(value),
                ..Self::ok(message)
            },
            Err(e) => Self::failure(500, format!("Failed to encode response: {}", e)),
        }
    }

    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            message: message.into(),
            details: None,
            data: None,
        }
    }

    pub fn from_error(err: &FleetError) -> Self {
        Self {
            details: err.details(),
            ..Self::failure(err.status_code(), err.to_string())
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// One line of a streaming response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamLine {
    /// Progress output
    Chunk { text: String },
    /// Sentinel: the remote command finished
    Exit { code: i32 },
    /// Sentinel: the stream could not be completed
    Error { message: String, status: u16 },
}

impl StreamLine {
    /// Whether this line terminates the stream
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, StreamLine::Chunk { .. })
    }
}

/// Tunnel state reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfo {
    pub host: HostId,
    pub local_port: u16,
    pub capture_port: u16,
    pub bridge_port: u16,
    pub status: TunnelStatus,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectFailure, SessionError};

    #[test]
    fn test_execute_request_wire_format() {
        let json = r#"{"type":"execute","host":"192.168.0.101",
            "credential":{"username":"admin","secret":"pw"},
            "action":"kill_process","payload":{"process_name":"firefox"}}"#;
        let req: ControlRequest = serde_json::from_str(json).unwrap();
        match req {
            ControlRequest::Execute(action) => {
                assert_eq!(action.host.as_str(), "192.168.0.101");
                assert_eq!(action.action, "kill_process");
                assert_eq!(action.payload["process_name"], "firefox");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_payload_defaults_to_null() {
        let json = r#"{"type":"stream","host":"h","credential":{"username":"u","secret":"s"},"action":"update_system"}"#;
        let req: ControlRequest = serde_json::from_str(json).unwrap();
        match req {
            ControlRequest::Stream(action) => assert!(action.payload.is_null()),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_unit_requests() {
        let json = serde_json::to_string(&ControlRequest::ListTunnels).unwrap();
        assert_eq!(json, r#"{"type":"list_tunnels"}"#);
    }

    #[test]
    fn test_response_from_error() {
        let err = FleetError::from(SessionError::Connection {
            host: "192.168.0.9".into(),
            kind: ConnectFailure::Timeout,
        });
        let resp = ControlResponse::from_error(&err);
        assert!(!resp.success);
        assert_eq!(resp.status, 504);
        assert!(resp.message.contains("192.168.0.9"));

        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_stream_sentinels() {
        assert!(!StreamLine::Chunk { text: "x".into() }.is_sentinel());
        assert!(StreamLine::Exit { code: 0 }.is_sentinel());
        let line = serde_json::to_string(&StreamLine::Exit { code: 3 }).unwrap();
        assert_eq!(line, r#"{"type":"exit","code":3}"#);
    }
}
