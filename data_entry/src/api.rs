// ********* Claim/Save/Finalize/Delete protocol ***********
//
// The network boundary of the coordinator. All arbitration between the two
// concurrent entry passes happens server-side; the claim call is the single
// source of truth for whether this client holds the entry slot.

use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::election::EntryTarget;
use crate::results::PollingStationResults;
use crate::validation::ValidationResults;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque continuation token persisted server-side across reloads.
///
/// The client echoes it back unmodified, except for the `continue` flag it
/// is allowed to set once saving has started.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientState(serde_json::Value);

impl Default for ClientState {
    fn default() -> ClientState {
        ClientState(serde_json::json!({}))
    }
}

impl ClientState {
    pub fn set_continue(&mut self, flag: bool) {
        if !self.0.is_object() {
            self.0 = serde_json::json!({});
        }
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert("continue".to_string(), serde_json::Value::Bool(flag));
        }
    }

    pub fn continues(&self) -> bool {
        self.0
            .get("continue")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Successful claim payload: the persisted record as the server knows it.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub client_state: ClientState,
    pub progress: u8,
    pub data: PollingStationResults,
}

/// The claim call distinguishes "no record yet" from failure.
#[derive(PartialEq, Debug, Clone)]
pub enum ClaimOutcome {
    Found(ClaimResponse),
    NotFound,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    pub data: PollingStationResults,
    pub client_state: ClientState,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveResponse {
    pub validation_results: ValidationResults,
}

/// Well-formed error body from the server.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub fatal: bool,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    /// The server answered with an error envelope (or a body we wrapped in
    /// one). Session conflicts, expiry and the like end up here.
    #[snafu(display("server rejected the request ({status}): {}", envelope.error))]
    Server { status: u16, envelope: ErrorEnvelope },
    /// Transport failure: offline, timeout, connection refused. Always
    /// recoverable by retrying; local values are never discarded for it.
    #[snafu(display("network failure: {message}"))]
    Network { message: String },
    #[snafu(display("could not decode the server response"))]
    Decode { source: std::io::Error },
}

impl ApiError {
    pub fn is_fatal(&self) -> bool {
        match self {
            ApiError::Server { envelope, .. } => envelope.fatal,
            ApiError::Network { .. } | ApiError::Decode { .. } => false,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// A cloneable summary of an [ApiError], suitable for keeping in state.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ApiFailure {
    pub status: Option<u16>,
    pub reference: Option<String>,
    pub fatal: bool,
    pub message: String,
}

impl From<&ApiError> for ApiFailure {
    fn from(err: &ApiError) -> ApiFailure {
        match err {
            ApiError::Server { status, envelope } => ApiFailure {
                status: Some(*status),
                reference: Some(envelope.reference.clone()),
                fatal: envelope.fatal,
                message: envelope.error.clone(),
            },
            other => ApiFailure {
                status: None,
                reference: None,
                fatal: false,
                message: other.to_string(),
            },
        }
    }
}

/// The protocol seam. The controller only talks to this trait; the HTTP
/// implementation below is one provider, the test suites bring their own.
pub trait EntryApi {
    fn claim(&self, target: &EntryTarget) -> ApiResult<ClaimOutcome>;
    fn save(&self, target: &EntryTarget, request: &SaveRequest) -> ApiResult<SaveResponse>;
    fn finalise(&self, target: &EntryTarget) -> ApiResult<()>;
    fn delete(&self, target: &EntryTarget) -> ApiResult<()>;
}

/// Blocking HTTP implementation of the protocol.
pub struct HttpEntryApi {
    agent: ureq::Agent,
    base_url: String,
    session_cookie: Option<String>,
}

impl HttpEntryApi {
    pub fn new(base_url: &str, session_cookie: Option<String>) -> HttpEntryApi {
        HttpEntryApi {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(CONNECT_TIMEOUT)
                .timeout_read(READ_TIMEOUT)
                .timeout_write(WRITE_TIMEOUT)
                .build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie,
        }
    }

    fn entry_url(&self, target: &EntryTarget) -> String {
        format!(
            "{}/api/elections/{}/polling_stations/{}/data_entries/{}",
            self.base_url, target.election_id, target.polling_station_id, target.entry_number
        )
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut req = self.agent.request(method, url);
        req = req.set("Accept", "application/json");
        if let Some(cookie) = &self.session_cookie {
            req = req.set("Cookie", cookie.as_str());
        }
        req
    }
}

/// Turns a ureq error into the protocol taxonomy, reading the envelope out
/// of the body when there is one.
fn map_call_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            let envelope = parse_envelope(status, &body);
            ApiError::Server { status, envelope }
        }
        ureq::Error::Transport(transport) => ApiError::Network {
            message: transport.to_string(),
        },
    }
}

fn parse_envelope(status: u16, body: &str) -> ErrorEnvelope {
    match serde_json::from_str::<ErrorEnvelope>(body.trim()) {
        Ok(envelope) => envelope,
        Err(_) => {
            warn!("non-envelope error body for status {}: {:?}", status, body);
            ErrorEnvelope {
                error: if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.trim().to_string()
                },
                fatal: (500..=599).contains(&status),
                reference: "InternalServerError".to_string(),
                code: Some(status),
            }
        }
    }
}

impl EntryApi for HttpEntryApi {
    fn claim(&self, target: &EntryTarget) -> ApiResult<ClaimOutcome> {
        let url = format!("{}/claim", self.entry_url(target));
        debug!("claim: POST {}", url);
        match self.request("POST", &url).call() {
            Ok(response) => {
                let claim: ClaimResponse = response.into_json().context(DecodeSnafu {})?;
                Ok(ClaimOutcome::Found(claim))
            }
            Err(ureq::Error::Status(404, _)) => Ok(ClaimOutcome::NotFound),
            Err(err) => Err(map_call_error(err)),
        }
    }

    fn save(&self, target: &EntryTarget, request: &SaveRequest) -> ApiResult<SaveResponse> {
        let url = self.entry_url(target);
        debug!("save: POST {}", url);
        let response = self
            .request("POST", &url)
            .send_json(request)
            .map_err(map_call_error)?;
        response.into_json().context(DecodeSnafu {})
    }

    fn finalise(&self, target: &EntryTarget) -> ApiResult<()> {
        let url = format!("{}/finalise", self.entry_url(target));
        debug!("finalise: POST {}", url);
        self.request("POST", &url).call().map_err(map_call_error)?;
        Ok(())
    }

    fn delete(&self, target: &EntryTarget) -> ApiResult<()> {
        let url = self.entry_url(target);
        debug!("delete: DELETE {}", url);
        self.request("DELETE", &url).call().map_err(map_call_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_state_sets_continue_without_touching_other_fields() {
        let mut state: ClientState =
            serde_json::from_str(r#"{"furthest": 3, "opaque": ["a", "b"]}"#).unwrap();
        assert!(!state.continues());
        state.set_continue(true);
        assert!(state.continues());
        let js = serde_json::to_value(&state).unwrap();
        assert_eq!(js["furthest"], 3);
        assert_eq!(js["opaque"][1], "b");
        assert_eq!(js["continue"], true);
    }

    #[test]
    fn client_state_survives_non_object_payloads() {
        let mut state: ClientState = serde_json::from_str("null").unwrap();
        state.set_continue(true);
        assert!(state.continues());
    }

    #[test]
    fn envelope_parse_falls_back_for_plain_bodies() {
        let envelope = parse_envelope(503, "service down");
        assert!(envelope.fatal);
        assert_eq!(envelope.error, "service down");
        assert_eq!(envelope.code, Some(503));

        let envelope = parse_envelope(409, "");
        assert!(!envelope.fatal);
        assert_eq!(envelope.error, "HTTP 409");
    }

    #[test]
    fn envelope_bodies_are_kept_as_is() {
        let body = r#"{"error": "already claimed", "fatal": false, "reference": "EntryInProgress"}"#;
        let envelope = parse_envelope(409, body);
        assert_eq!(envelope.reference, "EntryInProgress");
        assert!(!envelope.fatal);
        assert_eq!(envelope.code, None);
    }

    #[test]
    fn failure_summary_keeps_the_envelope_reference() {
        let err = ApiError::Server {
            status: 401,
            envelope: ErrorEnvelope {
                error: "session expired".to_string(),
                fatal: true,
                reference: "InvalidSession".to_string(),
                code: None,
            },
        };
        let failure = ApiFailure::from(&err);
        assert_eq!(failure.status, Some(401));
        assert_eq!(failure.reference.as_deref(), Some("InvalidSession"));
        assert!(failure.fatal);
        assert!(err.is_fatal());
    }
}
