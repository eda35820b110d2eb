//! Label-anchored field extraction over raw lease text.
//!
//! Every extractor is a single regular expression run against the text as it
//! came out of the PDF. Label extractors only fire at the start of a line
//! (optionally after a section number such as `1.2`) and capture the rest of
//! that line. Extractors are independent: one miss never blocks another.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{Confidence, LeaseAbstract};

/// Texts longer than this many characters are rated `high` confidence.
pub const HIGH_CONFIDENCE_MIN_CHARS: u64 = 500;

/// How far past a rent label the dollar amount may appear, on the same line.
const RENT_LABEL_WINDOW: usize = 120;

struct LeasePatterns {
    tenant: Regex,
    landlord: Regex,
    premises: Regex,
    commencement: Regex,
    expiration: Regex,
    base_rent: Regex,
    term_months: Regex,
}

fn label_pattern(label: &str) -> Regex {
    let pattern = format!(r"(?im)^[ \t]*(?:\d+(?:\.\d+)*\.?[ \t]+)?{label}[ \t]*:(.*)$");
    Regex::new(&pattern).expect("label pattern is valid")
}

fn patterns() -> &'static LeasePatterns {
    static PATTERNS: OnceLock<LeasePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| LeasePatterns {
        tenant: label_pattern("tenant"),
        landlord: label_pattern("landlord"),
        premises: label_pattern("premises"),
        commencement: label_pattern(r"commencement[ \t]+date"),
        expiration: label_pattern(r"expiration[ \t]+date"),
        base_rent: Regex::new(&format!(
            r"(?i)\b(?:base|minimum|fixed)[ \t]+rent\b[^\n$]{{0,{RENT_LABEL_WINDOW}}}(\$[ \t]?\d[\d,]*(?:\.\d{{1,2}})?)"
        ))
        .expect("rent pattern is valid"),
        term_months: Regex::new(r"(?i)\b(\d{1,4})\)?[ \t-]*months?\b")
            .expect("term pattern is valid"),
    })
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    let value = pattern.captures(text)?.get(1)?.as_str().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn tenant_name(text: &str) -> Option<String> {
    first_capture(&patterns().tenant, text)
}

pub fn landlord_name(text: &str) -> Option<String> {
    first_capture(&patterns().landlord, text)
}

pub fn premises(text: &str) -> Option<String> {
    first_capture(&patterns().premises, text)
}

pub fn lease_start(text: &str) -> Option<String> {
    first_capture(&patterns().commencement, text)
}

pub fn lease_end(text: &str) -> Option<String> {
    first_capture(&patterns().expiration, text)
}

/// First dollar amount on a line that carries a base/minimum/fixed rent
/// label. Bare dollar amounts elsewhere (CAM fees, deposits) are ignored.
pub fn base_rent(text: &str) -> Option<String> {
    first_capture(&patterns().base_rent, text)
        .map(|amount| amount.trim_end_matches(',').to_string())
}

pub fn term_months(text: &str) -> Option<u32> {
    first_capture(&patterns().term_months, text)?.parse().ok()
}

pub fn text_length(text: &str) -> u64 {
    text.chars().count() as u64
}

pub fn confidence_for_length(length: u64) -> Confidence {
    if length > HIGH_CONFIDENCE_MIN_CHARS {
        Confidence::High
    } else {
        Confidence::Low
    }
}

pub fn abstract_lease(text: &str) -> LeaseAbstract {
    let raw_text_length = text_length(text);
    let lease = LeaseAbstract {
        tenant_name: tenant_name(text),
        landlord_name: landlord_name(text),
        premises: premises(text),
        lease_start: lease_start(text),
        lease_end: lease_end(text),
        base_rent: base_rent(text),
        term_months: term_months(text),
        confidence: confidence_for_length(raw_text_length),
        raw_text_length,
    };
    tracing::debug!(
        chars = raw_text_length,
        confidence = lease.confidence.as_str(),
        tenant = lease.tenant_name.is_some(),
        landlord = lease.landlord_name.is_some(),
        rent = lease.base_rent.is_some(),
        "lease abstracted"
    );
    lease
}
