//! Request/reply envelope for a backend call.
//!
//! Process-based executors receive one [`InvokeRequest`] as JSON on stdin and
//! answer with one [`InvokeReply`] as JSON on stdout.

use serde::{Deserialize, Serialize};

use crate::spec::{InvocationResponse, InvocationSpec};

/// One call: which function, with what spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Name of the remote function to run.
    pub function: String,
    pub spec: InvocationSpec,
    #[serde(default)]
    pub return_logs: bool,
}

/// A response or an error, either one possibly carrying execution logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvokeReply {
    Success {
        response: InvocationResponse,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        logs: Option<String>,
    },
    Failure {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        logs: Option<String>,
    },
}
