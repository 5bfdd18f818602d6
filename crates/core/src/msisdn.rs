use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A phone identity in canonical international form: digits only, country
/// code first, no `+` prefix (`254712345678`). This is the key every
/// binding, membership and signup session is stored under, so both
/// transports must normalize to it before any lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Msisdn(String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MsisdnError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number `{0}` contains invalid characters")]
    InvalidCharacters(String),
    #[error("phone number `{0}` has an implausible length")]
    BadLength(String),
    #[error("phone number `{0}` is neither international nor local format")]
    Unroutable(String),
}

impl Msisdn {
    /// Normalize a raw sender identity. Accepted shapes:
    /// `+<cc><subscriber>`, `0<subscriber>` (the leading zero expands to
    /// `default_country_code`), or `<cc><subscriber>` already in
    /// international form. Transport prefixes (`whatsapp:`) and common
    /// separators are stripped first. Everything else is rejected.
    pub fn normalize(raw: &str, default_country_code: &str) -> Result<Self, MsisdnError> {
        let cleaned = raw
            .trim()
            .trim_start_matches("whatsapp:")
            .trim_start_matches("tel:")
            .replace([' ', '-', '(', ')', '.'], "");

        if cleaned.is_empty() {
            return Err(MsisdnError::Empty);
        }

        let (had_plus, digits) = match cleaned.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MsisdnError::InvalidCharacters(raw.trim().to_owned()));
        }

        let canonical = if had_plus {
            digits.to_owned()
        } else if let Some(local) = digits.strip_prefix('0') {
            format!("{default_country_code}{local}")
        } else if digits.starts_with(default_country_code) {
            digits.to_owned()
        } else {
            return Err(MsisdnError::Unroutable(raw.trim().to_owned()));
        };

        if !(10..=15).contains(&canonical.len()) {
            return Err(MsisdnError::BadLength(raw.trim().to_owned()));
        }

        Ok(Self(canonical))
    }

    /// Rehydrate a value that was stored in canonical form. Validates shape
    /// only; no country-code expansion happens here.
    pub fn from_canonical(raw: &str) -> Result<Self, MsisdnError> {
        if raw.is_empty() {
            return Err(MsisdnError::Empty);
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MsisdnError::InvalidCharacters(raw.to_owned()));
        }
        if !(10..=15).contains(&raw.len()) {
            return Err(MsisdnError::BadLength(raw.to_owned()));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form with the `+` prefix both transports accept for sends.
    pub fn to_e164(&self) -> String {
        format!("+{}", self.0)
    }
}

impl fmt::Display for Msisdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Msisdn, MsisdnError};

    #[test]
    fn local_number_expands_to_country_code() {
        let msisdn = Msisdn::normalize("0712 345 678", "254").expect("local format");
        assert_eq!(msisdn.as_str(), "254712345678");
    }

    #[test]
    fn international_forms_pass_through() {
        for raw in ["+254712345678", "254712345678", "whatsapp:+254712345678"] {
            let msisdn = Msisdn::normalize(raw, "254").expect(raw);
            assert_eq!(msisdn.as_str(), "254712345678");
        }
    }

    #[test]
    fn plus_prefixed_foreign_numbers_are_accepted() {
        let msisdn = Msisdn::normalize("+44 7700 900123", "254").expect("uk number");
        assert_eq!(msisdn.as_str(), "447700900123");
    }

    #[test]
    fn bare_subscriber_number_is_unroutable() {
        let error = Msisdn::normalize("712345678", "254").expect_err("no prefix");
        assert!(matches!(error, MsisdnError::Unroutable(_)));
    }

    #[test]
    fn junk_is_rejected_before_lookup() {
        assert!(matches!(Msisdn::normalize("", "254"), Err(MsisdnError::Empty)));
        assert!(matches!(
            Msisdn::normalize("07x1234", "254"),
            Err(MsisdnError::InvalidCharacters(_))
        ));
        assert!(matches!(Msisdn::normalize("+123", "254"), Err(MsisdnError::BadLength(_))));
    }

    #[test]
    fn canonical_rehydration_skips_country_expansion() {
        let msisdn = Msisdn::from_canonical("447700900123").expect("stored canonical value");
        assert_eq!(msisdn.as_str(), "447700900123");
        assert!(Msisdn::from_canonical("07x1234").is_err());
        assert!(Msisdn::from_canonical("").is_err());
    }

    #[test]
    fn e164_display_restores_plus() {
        let msisdn = Msisdn::normalize("0712345678", "254").expect("local format");
        assert_eq!(msisdn.to_e164(), "+254712345678");
    }
}
