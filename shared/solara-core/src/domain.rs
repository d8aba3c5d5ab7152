//! Core domain types used across the platform

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Customer identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phone number normalized to E.164 form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(Self::normalize(number.into()))
    }

    /// Strip formatting characters, keeping a single leading plus.
    fn normalize(number: String) -> String {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        format!("+{}", digits)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_number_normalization() {
        assert_eq!(PhoneNumber::new("+1 (555) 123-4567").as_str(), "+15551234567");
        assert_eq!(PhoneNumber::new("15551234567").as_str(), "+15551234567");
        assert_eq!(PhoneNumber::new("+15551234567").as_str(), "+15551234567");
    }

    #[test]
    fn test_customer_id_unique() {
        assert_ne!(CustomerId::generate(), CustomerId::generate());
    }
}
