// Cloudflare API v4 wire types
//
// Every response is wrapped in the same envelope:
//
// ```json
// { "success": true, "errors": [], "messages": [], "result": ... }
// ```
//
// Only the fields reconciliation reads are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

use cfsync_core::StoreError;

/// Response envelope shared by all endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the result, turning `success: false` into a provider fault
    pub fn into_result(self, what: &str) -> Result<T, StoreError> {
        if !self.success {
            let detail = join_messages(&self.errors);
            return Err(StoreError::provider_fault(format!("{} failed: {}", what, detail)));
        }

        self.result
            .ok_or_else(|| StoreError::provider_fault(format!("{} returned no result", what)))
    }
}

/// One entry of the `errors` array
#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Envelope of an error response, parsed only for its messages
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
}

/// `errors[].message` joined with ", ", or a placeholder
pub(crate) fn join_messages(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }

    errors
        .iter()
        .map(|e| {
            if e.code != 0 {
                format!("{} (code {})", e.message, e.code)
            } else {
                e.message.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Deserialize)]
pub(crate) struct Zone {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DnsRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
}

/// Body of create (POST) and update (PATCH) requests
#[derive(Debug, Serialize)]
pub(crate) struct RecordPayload<'a> {
    #[serde(rename = "type")]
    pub record_type: &'a str,
    pub name: &'a str,
    pub content: String,
    pub proxied: bool,
    /// `1` means automatic; only sent on create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}
