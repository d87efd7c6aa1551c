use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid phone number: {0}")]
pub struct PhoneError(String);

fn msisdn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\+?254|0)(7\d{8})$").expect("msisdn regex is valid"))
}

/// Normalizes a Kenyan mobile number to international MSISDN form (`2547XXXXXXXX`), which is the form the payment
/// provider expects. Accepts `07...`, `2547...` and `+2547...` inputs; everything else is rejected at the boundary
/// rather than handed to the provider.
pub fn normalize_msisdn(input: &str) -> Result<String, PhoneError> {
    let trimmed: String = input.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    let caps = msisdn_re().captures(&trimmed).ok_or_else(|| PhoneError(input.to_string()))?;
    Ok(format!("254{}", &caps[1]))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_common_forms() {
        assert_eq!(normalize_msisdn("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("+254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_msisdn("0712 345 678").unwrap(), "254712345678");
    }

    #[test]
    fn rejects_garbage() {
        assert!(normalize_msisdn("12345").is_err());
        assert!(normalize_msisdn("0812345678").is_err());
        assert!(normalize_msisdn("not-a-phone").is_err());
    }
}
