//! Daemon wire protocol.
//!
//! Newline-delimited JSON. Each request line gets exactly one response line;
//! a connection may carry any number of requests.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// Liveness probe. Always answered while the daemon is up.
    Ping,
    Status,
    /// Ask the daemon to drain and exit.
    Shutdown,
}

/// Snapshot returned by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub pid: u32,
    pub version: String,
    pub uptime_secs: u64,
    pub requests_served: u64,
    /// Connections currently open, including the one asking.
    pub active_connections: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Pong { pid: u32, version: String },
    Status(StatusReport),
    Ack,
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        assert_eq!(serde_json::to_value(Request::Ping).unwrap(), json!({"method": "ping"}));
        let req: Request = serde_json::from_str(r#"{"method":"shutdown"}"#).unwrap();
        assert_eq!(req, Request::Shutdown);
        assert!(serde_json::from_str::<Request>(r#"{"method":"reboot"}"#).is_err());
    }

    #[test]
    fn test_response_shape() {
        let pong = Response::Pong {
            pid: 7,
            version: "0.1.0".into(),
        };
        assert_eq!(
            serde_json::to_value(&pong).unwrap(),
            json!({"result": "pong", "pid": 7, "version": "0.1.0"})
        );
        assert_eq!(serde_json::to_value(Response::Ack).unwrap(), json!({"result": "ack"}));

        let status = Response::Status(StatusReport {
            pid: 1,
            version: "0.1.0".into(),
            uptime_secs: 3,
            requests_served: 4,
            active_connections: 1,
        });
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["result"], "status");
        assert_eq!(value["requests_served"], 4);
        assert_eq!(serde_json::from_value::<Response>(value).unwrap(), status);
    }
}
