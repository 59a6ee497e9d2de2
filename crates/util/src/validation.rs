//! Field validators.
//!
//! Validators never see an empty value; emptiness is handled by the
//! required-check in the form's validation engine before a validator runs.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("valid email pattern"));

/// Any URL ending in a slash-free id, or a bare id.
static ORCID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^((https?://)?(.*)/)?([^/]+)$").expect("valid orcid pattern"));

const ORCID_HOST: &str = "orcid.org";

/// Validates an e-mail address.
pub fn validate_email(email: &str) -> Result<(), String> {
    if EMAIL_PATTERN.is_match(email.trim()) {
        Ok(())
    } else {
        Err("Invalid email address".to_string())
    }
}

/// Validates an ORCID iD given bare (`0000-0002-1825-0097`) or as a URL on
/// `orcid.org`. The last character is an ISO 7064 11-2 check digit.
pub fn validate_orcid(orcid: &str) -> Result<(), String> {
    let captures = ORCID_PATTERN
        .captures(orcid.trim())
        .ok_or_else(|| "Invalid ORCID ID structure".to_string())?;
    let host = captures.get(1).and_then(|_| captures.get(3)).map(|m| m.as_str());
    let id = captures.get(4).map(|m| m.as_str()).unwrap_or_default();

    if let Some(host) = host
        && host != ORCID_HOST
    {
        return Err(format!("Invalid ORCID host, must be '{ORCID_HOST}' or empty."));
    }
    check_structure(id)?;
    check_checksum(id)
}

fn check_structure(id: &str) -> Result<(), String> {
    let groups: Vec<&str> = id.split('-').collect();
    if groups.len() != 4 {
        return Err("Invalid ORCID ID: expected 4 groups separated by dashes.".to_string());
    }
    if groups.iter().any(|group| group.chars().count() != 4) {
        return Err("Invalid ORCID ID: expected 4 digits per group.".to_string());
    }
    Ok(())
}

fn check_checksum(id: &str) -> Result<(), String> {
    let mut chars: Vec<char> = id.chars().collect();
    let Some(check_char) = chars.pop() else {
        return Err("Invalid ORCID ID structure".to_string());
    };

    let mut total: u64 = 0;
    for c in chars.into_iter().filter(|c| *c != '-') {
        let digit = c
            .to_digit(10)
            .ok_or_else(|| format!("Invalid ORCID ID: expected a digit, got '{c}'."))?;
        total = (total + u64::from(digit)) * 2;
    }
    let remainder = (12 - total % 11) % 11;
    let expected = if remainder == 10 {
        'X'
    } else {
        char::from_digit(remainder as u32, 10).unwrap_or('?')
    };

    if expected == check_char {
        Ok(())
    } else {
        Err("Invalid ORCID ID checksum".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_requires_local_part_and_dotted_domain() {
        assert!(validate_email("jane.doe@example.com").is_ok());
        assert!(validate_email("j@sub.example.org").is_ok());
        assert_eq!(validate_email("jane.doe"), Err("Invalid email address".to_string()));
        assert!(validate_email("jane@localhost").is_err());
        assert!(validate_email("jane doe@example.com").is_err());
    }

    #[test]
    fn orcid_accepts_bare_ids_and_orcid_urls() {
        assert!(validate_orcid("0000-0002-1825-0097").is_ok());
        assert!(validate_orcid("https://orcid.org/0000-0002-1825-0097").is_ok());
        assert!(validate_orcid("orcid.org/0000-0002-1694-233X").is_ok());
    }

    #[test]
    fn orcid_rejects_foreign_hosts() {
        let error = validate_orcid("https://example.com/0000-0002-1825-0097").unwrap_err();
        assert!(error.contains("Invalid ORCID host"), "{error}");
    }

    #[test]
    fn orcid_reports_structure_before_checksum() {
        assert_eq!(
            validate_orcid("0000-0002-1825"),
            Err("Invalid ORCID ID: expected 4 groups separated by dashes.".to_string())
        );
        assert_eq!(
            validate_orcid("0000-0002-18250-097"),
            Err("Invalid ORCID ID: expected 4 digits per group.".to_string())
        );
        assert_eq!(
            validate_orcid("0000-000a-1825-0097"),
            Err("Invalid ORCID ID: expected a digit, got 'a'.".to_string())
        );
        assert_eq!(validate_orcid("0000-0002-1825-0098"), Err("Invalid ORCID ID checksum".to_string()));
    }
}
