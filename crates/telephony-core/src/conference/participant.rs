//! IMS conference roster entries
//!
//! The network identifies participants only by address, so a roster entry is
//! keyed by its `(handle, endpoint)` pair. Handles arrive as SIP or tel URIs
//! with arbitrary parameters; [`numbers_match`] compares just the numbers.

use serde::{Deserialize, Serialize};

use crate::types::CallState;

/// Identity of a roster entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantKey {
    pub handle: String,
    pub endpoint: String,
}

/// One entry of a conference event package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceParticipant {
    pub handle: String,
    pub endpoint: String,
    pub state: CallState,
}

impl ConferenceParticipant {
    pub fn new(handle: impl Into<String>, endpoint: impl Into<String>, state: CallState) -> Self {
        Self {
            handle: handle.into(),
            endpoint: endpoint.into(),
            state,
        }
    }

    pub fn key(&self) -> ParticipantKey {
        ParticipantKey {
            handle: self.handle.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

/// Minimum trailing digits two numbers must share to be considered equal
const MIN_MATCH: usize = 7;

/// User part of a handle: scheme removed, cut at the first `@`, `;` or `:`.
///
/// `sip:5551212@host.com;user=phone` and `tel:5551212;phone-context=x` both
/// yield `5551212`.
pub fn user_part(handle: &str) -> &str {
    let ssp = match handle.split_once(':') {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => handle,
    };
    ssp.split(['@', ';', ':']).next().unwrap_or("")
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Dialable characters of a number, visual separators and leading `+` dropped
fn dialable(number: &str) -> String {
    number
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '*' | '#'))
        .collect()
}

/// Loose comparison of two handles' numbers.
///
/// Equal when the dialable digits are identical, or when both have at least
/// seven digits and the trailing seven agree (tolerates a country or trunk
/// prefix on one side).
pub fn numbers_match(a: &str, b: &str) -> bool {
    let a = dialable(user_part(a));
    let b = dialable(user_part(b));
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    if a.len() < MIN_MATCH || b.len() < MIN_MATCH {
        return false;
    }
    a[a.len() - MIN_MATCH..] == b[b.len() - MIN_MATCH..]
}
