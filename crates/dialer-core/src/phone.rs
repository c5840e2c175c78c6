//! Phone number normalisation for uploaded contacts
//!
//! Uploaded sheets carry numbers in whatever shape the operator typed them:
//! `(555) 123-4567`, `+44 20 7946 0958`, `15551234567`. Before a number is
//! dialed it is reduced to digits and given a `+` prefix:
//!
//! | raw value                  | result                       |
//! |----------------------------|------------------------------|
//! | starts with `+`            | `+{digits}` (kept as written)|
//! | exactly 10 digits          | `{country code}{digits}`     |
//! | 11 or more digits          | `+{digits}`                  |
//! | 1 to 9 digits              | digits, not dialable         |
//!
//! ```rust
//! use dialer_core::phone::{format_phone, CountryCode};
//!
//! let us: CountryCode = "+1".parse().unwrap();
//! assert_eq!(format_phone("(555) 123-4567", &us), "+15551234567");
//! assert_eq!(format_phone("+44 20 7946 0958", &us), "+442079460958");
//! assert_eq!(format_phone("919876543210", &us), "+919876543210");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DialerError;

/// International dialing prefix, always stored as `+{digits}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// The code including its leading `+`
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CountryCode {
    fn default() -> Self {
        Self("+1".to_string())
    }
}

impl FromStr for CountryCode {
    type Err = DialerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(DialerError::config(
                "country_code",
                format!("'{s}' is not a dialing code"),
            ));
        }
        if digits.len() > 3 {
            return Err(DialerError::config(
                "country_code",
                format!("'{s}' is longer than 3 digits"),
            ));
        }
        Ok(Self(format!("+{digits}")))
    }
}

impl TryFrom<String> for CountryCode {
    type Error = DialerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip everything but ASCII digits
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Derive a dialable number from a raw sheet value
pub fn format_phone(raw: &str, country_code: &CountryCode) -> String {
    let digits = digits_only(raw);
    if digits.is_empty() {
        return String::new();
    }

    if raw.trim_start().starts_with('+') {
        return format!("+{digits}");
    }

    match digits.len() {
        10 => format!("{}{}", country_code.as_str(), digits),
        n if n >= 11 => format!("+{digits}"),
        _ => digits,
    }
}

/// `+` followed by an E.164-length run of digits
pub fn is_dialable(phone: &str) -> bool {
    match phone.strip_prefix('+') {
        Some(rest) => (8..=15).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}
