use serde::{Deserialize, Serialize};

/// A configuration update, created per request and published as JSON.
///
/// `objective` is omitted from the serialized form when absent, so
/// `{ mode: "sleeping" }` serializes to exactly `{"mode":"sleeping"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
}

impl Configuration {
    /// The placeholder served by `GET /api/v1/config`.
    pub fn placeholder() -> Self {
        Self {
            mode: "sleeping".to_string(),
            objective: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
