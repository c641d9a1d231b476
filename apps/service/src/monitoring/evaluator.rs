//! Up/down decision and edge-triggered alerting.

use super::types::{Check, CheckState, Evaluation, Outcome};

/// Decide the check's new state and whether its owner should be alerted.
///
/// A check is up iff the probe produced a response whose code is one of the
/// check's success codes. Alerting requires both a prior evaluation
/// (`last_checked` present) and a state change, so the very first
/// evaluation of a check never alerts regardless of its result.
pub fn evaluate(check: &Check, outcome: &Outcome) -> Evaluation {
    let state = if outcome.error_kind.is_none()
        && outcome
            .response_code
            .is_some_and(|code| check.success_codes.contains(&code))
    {
        CheckState::Up
    } else {
        CheckState::Down
    };

    Evaluation {
        state,
        alert_warranted: check.last_checked.is_some() && check.state != state,
    }
}

/// Human-readable message sent to the check's owner on a state flip.
pub fn alert_message(check: &Check, state: CheckState) -> String {
    format!(
        "Alert: your check for {} {}://{} is currently {}",
        check.method.as_upper(),
        check.protocol,
        check.url,
        state
    )
}
