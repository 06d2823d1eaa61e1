//! Validation of decoded notification jobs
//!
//! Turns a [`RawNotificationJob`] into a typed [`NotificationJob`] or a
//! [`ValidationError`] describing the first problem found. Pure, no I/O.

use crate::payloads::{
    MatchSummary, NotificationJob, PresentationMetadata, RawNotificationJob, Recipient,
};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Validation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Missing recipient block")]
    MissingRecipient,

    #[error("Missing recipient display name")]
    MissingDisplayName,

    #[error("Invalid match count: matchSummary.totalMatches must be a number greater than 0")]
    InvalidMatchCount,

    #[error("Missing gallery link base in presentation metadata")]
    MissingGalleryLink,

    #[error("No usable contact channel: {0}")]
    Unreachable(String),
}

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Switches that change which contact details make a job actionable
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    pub chat_enabled: bool,
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    // local@domain.tld shape only; exotic but valid addresses are rejected
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

/// Simple `local@domain.tld` shape check
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_regex().is_some_and(|regex| regex.is_match(email))
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_match_count(value: Option<&serde_json::Value>) -> ValidationResult<u32> {
    let number = match value {
        Some(serde_json::Value::Number(number)) => number,
        _ => return Err(ValidationError::InvalidMatchCount),
    };

    let as_float = number.as_f64().ok_or(ValidationError::InvalidMatchCount)?;
    if !as_float.is_finite() || as_float <= 0.0 {
        return Err(ValidationError::InvalidMatchCount);
    }

    let count = number.as_u64().unwrap_or_else(|| as_float.ceil() as u64);
    Ok(count.min(u32::MAX as u64) as u32)
}

fn clamp_score(score: Option<f64>) -> f64 {
    score.filter(|s| s.is_finite()).unwrap_or(0.0).clamp(0.0, 1.0)
}

/// Validate a raw job, short-circuiting at the first failure
pub fn validate_job(
    raw: &RawNotificationJob,
    options: &ValidationOptions,
) -> ValidationResult<NotificationJob> {
    let event_id = non_blank(raw.event_id.as_ref())
        .ok_or(ValidationError::MissingField { field: "eventId" })?;
    let guest_id = non_blank(raw.guest_id.as_ref())
        .ok_or(ValidationError::MissingField { field: "guestId" })?;

    let recipient = raw
        .recipient
        .as_ref()
        .ok_or(ValidationError::MissingRecipient)?;
    let display_name =
        non_blank(recipient.display_name.as_ref()).ok_or(ValidationError::MissingDisplayName)?;

    let summary = raw
        .match_summary
        .as_ref()
        .ok_or(ValidationError::InvalidMatchCount)?;
    let total_matches = parse_match_count(summary.total_matches.as_ref())?;

    let presentation = raw
        .presentation_metadata
        .as_ref()
        .ok_or(ValidationError::MissingGalleryLink)?;
    let gallery_link_base = non_blank(presentation.gallery_link_base.as_ref())
        .ok_or(ValidationError::MissingGalleryLink)?;

    let email = non_blank(recipient.email.as_ref()).filter(|email| is_valid_email(email));
    let phone = non_blank(recipient.phone.as_ref());

    let chat_reachable = options.chat_enabled && phone.is_some();
    if email.is_none() && !chat_reachable {
        let reason = if options.chat_enabled {
            "no valid email address and no phone number"
        } else {
            "no valid email address and chat channel is disabled"
        };
        return Err(ValidationError::Unreachable(reason.to_string()));
    }

    Ok(NotificationJob {
        event_id,
        guest_id,
        recipient: Recipient {
            email,
            phone,
            display_name,
        },
        match_summary: MatchSummary {
            total_matches,
            best_score: clamp_score(summary.best_score),
            average_score: clamp_score(summary.average_score),
            top_matches: summary.top_matches.clone(),
        },
        presentation: PresentationMetadata {
            event_name: non_blank(presentation.event_name.as_ref()),
            event_date: non_blank(presentation.event_date.as_ref()),
            business_name: non_blank(presentation.business_name.as_ref()),
            business_logo_url: non_blank(presentation.business_logo_url.as_ref()),
            gallery_link_base,
        },
    })
}
