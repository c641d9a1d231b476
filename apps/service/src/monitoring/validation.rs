//! Sanity checking of raw check records before they enter the pipeline.
//!
//! Records come out of the registry as untyped JSON; the persistence layer
//! makes no format promises beyond "an object per id". The validator owns
//! all coercion: strings are trimmed, enums matched case-sensitively, and a
//! record is accepted only if every required field holds. `state` and
//! `lastChecked` are the exception: they default instead of rejecting, so
//! a record written by the account-facing flow (which never sets them) is
//! still well-formed on its first evaluation.

use serde_json::Value;
use thiserror::Error;

use super::types::{Check, CheckState, HttpMethod, Protocol};

/// A raw record failed coercion on the named field.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("check record field `{0}` is missing or malformed")]
pub struct ValidationError(pub &'static str);

/// Coerce a raw registry record into a well-formed [`Check`].
pub fn validate_check_record(raw: &Value) -> Result<Check, ValidationError> {
    let id = trimmed_string(raw, "id")
        .filter(|id| id.chars().count() == 20)
        .ok_or(ValidationError("id"))?;

    let user_phone = trimmed_string(raw, "userPhone")
        .filter(|phone| phone.chars().count() == 10)
        .ok_or(ValidationError("userPhone"))?;

    let protocol = trimmed_string(raw, "protocol")
        .and_then(|protocol| match protocol.as_str() {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        })
        .ok_or(ValidationError("protocol"))?;

    let url = trimmed_string(raw, "url")
        .filter(|url| !url.is_empty())
        .ok_or(ValidationError("url"))?;

    let method = trimmed_string(raw, "method")
        .and_then(|method| match method.as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            _ => None,
        })
        .ok_or(ValidationError("method"))?;

    let success_codes = success_codes(raw).ok_or(ValidationError("successCodes"))?;

    let timeout_seconds = raw
        .get("timeoutSeconds")
        .and_then(Value::as_u64)
        .filter(|timeout| (1..=5).contains(timeout))
        .ok_or(ValidationError("timeoutSeconds"))?;

    // Never-evaluated checks carry neither of these.
    let state = trimmed_string(raw, "state")
        .and_then(|state| match state.as_str() {
            "up" => Some(CheckState::Up),
            "down" => Some(CheckState::Down),
            _ => None,
        })
        .unwrap_or_default();

    let last_checked = raw
        .get("lastChecked")
        .and_then(Value::as_i64)
        .filter(|millis| *millis > 0);

    Ok(Check {
        id,
        user_phone,
        protocol,
        url,
        method,
        success_codes,
        timeout_seconds,
        state,
        last_checked,
    })
}

fn trimmed_string(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(|value| value.trim().to_owned())
}

fn success_codes(raw: &Value) -> Option<Vec<u16>> {
    let codes = raw.get("successCodes")?.as_array()?;
    if codes.is_empty() {
        return None;
    }
    codes
        .iter()
        .map(|code| code.as_u64().and_then(|code| u16::try_from(code).ok()))
        .collect()
}
