//! Customer directory
//!
//! Ordinary CRUD over registered customers. In-memory store keyed by
//! customer id with a phone-number index; the conversation flow only
//! consumes it for campaign kickoff and greeting personalization.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use validator::Validate;

use solara_core::{CustomerId, PhoneNumber};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: PhoneNumber,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Registration request body
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewCustomer {
    #[validate(length(min = 1))]
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[validate(length(min = 1))]
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[validate(length(min = 4))]
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Customer already exists")]
    AlreadyExists,

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// In-memory customer directory
pub struct CustomerDirectory {
    customers: DashMap<String, Customer>,
    by_phone: DashMap<String, String>,
}

impl CustomerDirectory {
    pub fn new() -> Self {
        Self {
            customers: DashMap::new(),
            by_phone: DashMap::new(),
        }
    }

    pub fn create(&self, new: NewCustomer) -> Result<Customer, DirectoryError> {
        new.validate()
            .map_err(|e| DirectoryError::Validation(e.to_string()))?;

        let phone = PhoneNumber::new(new.phone_number);
        if self.by_phone.contains_key(phone.as_str()) {
            return Err(DirectoryError::AlreadyExists);
        }
        if self
            .customers
            .iter()
            .any(|c| c.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(DirectoryError::AlreadyExists);
        }

        let customer = Customer {
            id: CustomerId::generate(),
            first_name: new.first_name,
            last_name: new.last_name,
            phone_number: phone.clone(),
            email: new.email,
            created_at: Utc::now(),
        };

        self.by_phone
            .insert(phone.as_str().to_string(), customer.id.as_str().to_string());
        self.customers
            .insert(customer.id.as_str().to_string(), customer.clone());

        tracing::info!(customer_id = %customer.id, "Customer registered");
        Ok(customer)
    }

    pub fn find_by_phone(&self, number: &PhoneNumber) -> Option<Customer> {
        let id = self.by_phone.get(number.as_str())?;
        self.customers.get(id.value()).map(|c| c.clone())
    }

    pub fn list(&self) -> Vec<Customer> {
        self.customers.iter().map(|c| c.clone()).collect()
    }
}

impl Default for CustomerDirectory {
    fn default() -> Self {
        Self::new()
    }
}
