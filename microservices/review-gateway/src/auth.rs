//! Webhook request authentication
//!
//! Validates the `X-Twilio-Signature` header: HMAC-SHA1 keyed on the
//! account auth token over the full request URL followed by the
//! alphabetically sorted form parameters, base64-encoded. A request
//! without a signature header is always invalid.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashMap;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

#[derive(Clone)]
pub struct RequestValidator {
    auth_token: String,
}

impl RequestValidator {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
        }
    }

    /// Check a webhook request against its signature header.
    ///
    /// `url` must be the byte-for-byte URL the provider signed, i.e. the
    /// externally reachable base URL plus the request path.
    pub fn is_valid(
        &self,
        url: &str,
        params: &HashMap<String, String>,
        signature: Option<&str>,
    ) -> bool {
        let Some(signature) = signature else {
            return false;
        };

        let mut sorted: Vec<(&String, &String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut data = url.to_string();
        for (key, value) in sorted {
            data.push_str(key);
            data.push_str(value);
        }

        let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(self.auth_token.as_bytes()) else {
            return false;
        };
        mac.update(data.as_bytes());
        let expected =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        signature == expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HashMap<String, String> {
        HashMap::from([
            ("From".to_string(), "+15551234567".to_string()),
            ("Body".to_string(), "yes".to_string()),
        ])
    }

    #[test]
    fn test_valid_signature_accepted() {
        let validator = RequestValidator::new("test-auth-token");
        // HMAC-SHA1("test-auth-token",
        //   "https://resorts.example.com/smsBodyyesFrom+15551234567")
        assert!(validator.is_valid(
            "https://resorts.example.com/sms",
            &params(),
            Some("CGtJorIOtMMAXX3sNPN6mvouIG8="),
        ));
    }

    #[test]
    fn test_missing_header_always_rejected() {
        let validator = RequestValidator::new("test-auth-token");
        assert!(!validator.is_valid("https://resorts.example.com/sms", &params(), None));
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let validator = RequestValidator::new("test-auth-token");
        assert!(!validator.is_valid(
            "https://resorts.example.com/sms",
            &params(),
            Some("AAAAorIOtMMAXX3sNPN6mvouIG8="),
        ));
    }

    #[test]
    fn test_url_is_part_of_the_signature() {
        let validator = RequestValidator::new("test-auth-token");
        assert!(!validator.is_valid(
            "https://other.example.com/sms",
            &params(),
            Some("CGtJorIOtMMAXX3sNPN6mvouIG8="),
        ));
    }

    #[test]
    fn test_single_param_signature() {
        let validator = RequestValidator::new("test-auth-token");
        let params = HashMap::from([("To".to_string(), "+15557654321".to_string())]);
        assert!(validator.is_valid(
            "https://resorts.example.com/call-event",
            &params,
            Some("46WvNedANxkaDdpDmAgmRbeqo/Q="),
        ));
    }
}
