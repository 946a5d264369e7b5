// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Submission Validation Domain
//!
//! Normalizes and validates a candidate store payload regardless of origin
//! (dialogue draft or direct form submission).
//!
//! Every rule is evaluated — validation never fails fast — so the caller
//! receives the complete violation list in a single pass and the dialogue
//! engine can build one combined re-prompt instead of a back-and-forth per
//! field.
//!
//! | Field | Rule |
//! |-------|------|
//! | `name` | non-empty, ≤ 120 chars |
//! | `phone` | loose international pattern, 7–15 digits |
//! | `location` | non-empty free text |
//! | `opens_at`/`closes_at` | valid time-of-day, must differ (wrap past midnight is legal) |
//! | `description` | 10–1000 chars |

use chrono::NaiveTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::domain::dialogue::SlotName;

const NAME_MAX_CHARS: usize = 120;
const DESCRIPTION_MIN_CHARS: usize = 10;
const DESCRIPTION_MAX_CHARS: usize = 1000;

/// Loose international phone shape: optional leading `+`, then digits with
/// common separators. Digit count is checked separately.
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-\.\(\)]*$").expect("static pattern"));

/// Raw candidate store payload as received from a form or a completed
/// dialogue draft. All fields are untrusted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSubmission {
    pub name: String,
    pub phone: String,
    pub location: String,
    pub opens_at: String,
    pub closes_at: String,
    pub description: String,
    #[serde(default)]
    pub photo_ref: Option<String>,
}

/// A single field-level validation failure. Recoverable: the submitter is
/// re-prompted for the offending fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: SlotName,
    pub message: String,
}

impl FieldViolation {
    fn new(field: SlotName, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A submission that passed every rule, with whitespace normalized and
/// times parsed. The only way to construct a `Store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedStore {
    pub name: String,
    pub phone: String,
    pub location: String,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub description: String,
    pub photo_ref: Option<String>,
}

impl NormalizedStore {
    /// Duplicate-detection key component for the name.
    pub fn name_key(&self) -> String {
        normalize_key(&self.name)
    }

    /// Duplicate-detection key component for the free-text location.
    pub fn location_key(&self) -> String {
        normalize_key(&self.location)
    }
}

/// Lowercase + collapse whitespace runs. Used for the duplicate heuristic's
/// normalized-name+location key.
pub fn normalize_key(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Domain service validating candidate store payloads.
pub struct SubmissionValidator;

impl SubmissionValidator {
    /// Validate and normalize a submission. All rules are evaluated; the
    /// error side carries every violation found.
    pub fn validate(payload: &StoreSubmission) -> Result<NormalizedStore, Vec<FieldViolation>> {
        let mut violations = Vec::new();

        let name = collapse_whitespace(&payload.name);
        if name.is_empty() {
            violations.push(FieldViolation::new(SlotName::Name, "name must not be empty"));
        } else if name.chars().count() > NAME_MAX_CHARS {
            violations.push(FieldViolation::new(
                SlotName::Name,
                format!("name must be at most {} characters", NAME_MAX_CHARS),
            ));
        }

        let phone = payload.phone.trim().to_string();
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        if !PHONE_PATTERN.is_match(&phone) || !(7..=15).contains(&digits) {
            violations.push(FieldViolation::new(
                SlotName::Phone,
                "phone must be a valid phone number, e.g. +2348110453053",
            ));
        }

        let location = collapse_whitespace(&payload.location);
        if location.is_empty() {
            violations.push(FieldViolation::new(
                SlotName::Location,
                "location must not be empty",
            ));
        }

        let opens_at = parse_time_of_day(&payload.opens_at);
        if opens_at.is_none() {
            violations.push(FieldViolation::new(
                SlotName::OpensAt,
                "opening time must be a time of day like 08:30",
            ));
        }
        let closes_at = parse_time_of_day(&payload.closes_at);
        if closes_at.is_none() {
            violations.push(FieldViolation::new(
                SlotName::ClosesAt,
                "closing time must be a time of day like 21:00",
            ));
        }
        // Wrap-past-midnight ranges are legal; only identical times are not.
        if let (Some(open), Some(close)) = (opens_at, closes_at) {
            if open == close {
                violations.push(FieldViolation::new(
                    SlotName::ClosesAt,
                    "closing time must differ from opening time",
                ));
            }
        }

        let description = payload.description.trim().to_string();
        let desc_chars = description.chars().count();
        if !(DESCRIPTION_MIN_CHARS..=DESCRIPTION_MAX_CHARS).contains(&desc_chars) {
            violations.push(FieldViolation::new(
                SlotName::Description,
                format!(
                    "description must be between {} and {} characters",
                    DESCRIPTION_MIN_CHARS, DESCRIPTION_MAX_CHARS
                ),
            ));
        }

        if !violations.is_empty() {
            return Err(violations);
        }

        Ok(NormalizedStore {
            name,
            phone,
            location,
            opens_at: opens_at.expect("validated above"),
            closes_at: closes_at.expect("validated above"),
            description,
            photo_ref: payload
                .photo_ref
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_submission() -> StoreSubmission {
        StoreSubmission {
            name: "Iya Moria".to_string(),
            phone: "+2348110453053".to_string(),
            location: "13 Moria Rd".to_string(),
            opens_at: "08:30".to_string(),
            closes_at: "21:00".to_string(),
            description: "Great amala spot".to_string(),
            photo_ref: None,
        }
    }

    #[test]
    fn test_valid_submission_normalizes() {
        let normalized = SubmissionValidator::validate(&valid_submission()).unwrap();
        assert_eq!(normalized.name, "Iya Moria");
        assert_eq!(normalized.opens_at, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(normalized.closes_at, NaiveTime::from_hms_opt(21, 0, 0).unwrap());
        assert_eq!(normalized.name_key(), "iya moria");
    }

    #[test]
    fn test_all_violations_reported_in_one_pass() {
        let payload = StoreSubmission {
            name: String::new(),
            phone: "not-a-phone".to_string(),
            location: "  ".to_string(),
            opens_at: "8 in the morning".to_string(),
            closes_at: "21:00".to_string(),
            description: "short".to_string(),
            photo_ref: None,
        };

        let violations = SubmissionValidator::validate(&payload).unwrap_err();
        let fields: Vec<SlotName> = violations.iter().map(|v| v.field).collect();
        assert_eq!(
            fields,
            vec![
                SlotName::Name,
                SlotName::Phone,
                SlotName::Location,
                SlotName::OpensAt,
                SlotName::Description,
            ]
        );
    }

    #[test]
    fn test_two_missing_fields_yield_exactly_two_violations() {
        let mut payload = valid_submission();
        payload.name = String::new();
        payload.description = String::new();

        let violations = SubmissionValidator::validate(&payload).unwrap_err();
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_phone_patterns() {
        let mut payload = valid_submission();
        for ok in ["+234 811 045 3053", "08110453053", "(+44) 20 7946-0958"] {
            payload.phone = ok.to_string();
            assert!(SubmissionValidator::validate(&payload).is_ok(), "rejected {}", ok);
        }
        for bad in ["call me", "12345", "+", "080-CHOPS"] {
            payload.phone = bad.to_string();
            assert!(SubmissionValidator::validate(&payload).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_wrap_past_midnight_is_legal() {
        let mut payload = valid_submission();
        payload.opens_at = "18:00".to_string();
        payload.closes_at = "02:00".to_string();
        assert!(SubmissionValidator::validate(&payload).is_ok());
    }

    #[test]
    fn test_identical_open_close_rejected() {
        let mut payload = valid_submission();
        payload.opens_at = "09:00".to_string();
        payload.closes_at = "09:00".to_string();

        let violations = SubmissionValidator::validate(&payload).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, SlotName::ClosesAt);
    }

    #[test]
    fn test_name_length_boundary() {
        let mut payload = valid_submission();
        payload.name = "x".repeat(120);
        assert!(SubmissionValidator::validate(&payload).is_ok());
        payload.name = "x".repeat(121);
        assert!(SubmissionValidator::validate(&payload).is_err());
    }

    #[test]
    fn test_description_bounds() {
        let mut payload = valid_submission();
        payload.description = "x".repeat(1000);
        assert!(SubmissionValidator::validate(&payload).is_ok());
        payload.description = "x".repeat(1001);
        assert!(SubmissionValidator::validate(&payload).is_err());
    }

    #[test]
    fn test_blank_photo_ref_dropped() {
        let mut payload = valid_submission();
        payload.photo_ref = Some("   ".to_string());
        let normalized = SubmissionValidator::validate(&payload).unwrap();
        assert!(normalized.photo_ref.is_none());
    }
}
