use serde::{Deserialize, Serialize};

/// Whether a check's target is considered reachable.
///
/// A never-evaluated check has no explicit "unknown" state; it starts as
/// down and the first evaluation's alert suppression keys off the absence
/// of `last_checked` instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Up,
    #[default]
    Down,
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckState::Up => write!(f, "up"),
            CheckState::Down => write!(f, "down"),
        }
    }
}

/// Scheme used to reach the check's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// HTTP method a check probes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Upper-cased form, as sent on the wire and shown in alerts.
    pub fn as_upper(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// One monitored target, as persisted in the check registry.
///
/// Field names follow the registry's on-disk camelCase format. `id` and
/// `user_phone` are assigned by the account-facing flow and never change
/// here; the engine only rewrites `state` and `last_checked`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: String,
    pub user_phone: String,
    pub protocol: Protocol,
    pub url: String,
    pub method: HttpMethod,
    pub success_codes: Vec<u16>,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub state: CheckState,
    /// Epoch milliseconds of the last evaluation; absent until the check
    /// has been evaluated once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,
}

impl Check {
    /// Full target address including the scheme.
    pub fn target(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }
}

/// Why a probe failed to produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeFailure {
    #[serde(rename = "network-error")]
    NetworkError,
    #[serde(rename = "timeout")]
    Timeout,
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeFailure::NetworkError => write!(f, "network-error"),
            ProbeFailure::Timeout => write!(f, "timeout"),
        }
    }
}

/// Resolved result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProbeFailure>,
}

impl Outcome {
    /// The target answered with the given status code.
    pub fn response(code: u16) -> Self {
        Self { response_code: Some(code), error_kind: None }
    }

    /// The request failed before any response arrived.
    pub fn network_error() -> Self {
        Self { response_code: None, error_kind: Some(ProbeFailure::NetworkError) }
    }

    /// The request outlived the check's timeout.
    pub fn timed_out() -> Self {
        Self { response_code: None, error_kind: Some(ProbeFailure::Timeout) }
    }
}

/// Decision derived from an outcome and the check's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: CheckState,
    pub alert_warranted: bool,
}

/// Record appended to the per-check evaluation log after every probe.
///
/// `check` is the pre-update snapshot; `time` is the evaluation timestamp
/// in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalLogEntry {
    pub check: Check,
    pub outcome: Outcome,
    pub state: CheckState,
    pub alert_warranted: bool,
    pub time: i64,
}
