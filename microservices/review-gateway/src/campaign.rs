//! Campaign dispatch
//!
//! Fans the greet+invite step out across the customer list, one task per
//! customer with a bounded concurrency cap, and joins on every outcome.
//! Per-customer failures are collected into the report instead of being
//! dropped.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{self, Substitutions, TemplateId};
use crate::customers::Customer;
use crate::metrics::ReviewMetrics;
use crate::transport::{TransportError, TransportGateway};

/// Outcome of one campaign kickoff
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    /// Customers the greet+invite pair was attempted for
    pub invited: usize,
    pub failures: Vec<CampaignFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignFailure {
    pub phone_number: String,
    pub reason: String,
}

pub struct CampaignDispatcher {
    transport: Arc<dyn TransportGateway>,
    metrics: ReviewMetrics,
    concurrency: usize,
}

impl CampaignDispatcher {
    pub fn new(
        transport: Arc<dyn TransportGateway>,
        metrics: ReviewMetrics,
        concurrency: usize,
    ) -> Self {
        Self {
            transport,
            metrics,
            concurrency: concurrency.max(1),
        }
    }

    /// Greet and invite every customer. All customers are attempted; the
    /// join waits for every task before the report is produced.
    pub async fn start_campaign(&self, customers: Vec<Customer>) -> CampaignReport {
        let invited = customers.len();
        info!(customers = invited, "Starting review campaign");

        let outcomes: Vec<Option<CampaignFailure>> = stream::iter(customers)
            .map(|customer| async move {
                match self.greet_and_invite(&customer).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(
                            phone_number = %customer.phone_number,
                            error = %e,
                            "Campaign invite failed"
                        );
                        Some(CampaignFailure {
                            phone_number: customer.phone_number.to_string(),
                            reason: e.to_string(),
                        })
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let failures: Vec<CampaignFailure> = outcomes.into_iter().flatten().collect();
        info!(
            invited,
            failed = failures.len(),
            "Review campaign dispatched"
        );

        CampaignReport { invited, failures }
    }

    /// The fresh-state greeting sequence, applied directly: campaign
    /// recipients are assumed to have no live conversation.
    async fn greet_and_invite(&self, customer: &Customer) -> Result<(), TransportError> {
        let greeting = catalog::render(
            TemplateId::Greeting,
            Substitutions {
                name: Some(&customer.first_name),
            },
        );
        self.transport
            .send_sms(&customer.phone_number, &greeting)
            .await?;

        let invite = catalog::render(TemplateId::ParticipationInvite, Substitutions::default());
        self.transport
            .send_sms(&customer.phone_number, &invite)
            .await?;

        self.metrics.invites_sent.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use solara_core::{CustomerId, PhoneNumber};

    struct CountingTransport {
        sms: parking_lot::Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    impl CountingTransport {
        fn new(fail_for: Option<&str>) -> Self {
            Self {
                sms: parking_lot::Mutex::new(Vec::new()),
                fail_for: fail_for.map(str::to_string),
            }
        }
    }

    #[async_trait]
    impl TransportGateway for CountingTransport {
        async fn send_sms(&self, to: &PhoneNumber, _body: &str) -> Result<(), TransportError> {
            if self.fail_for.as_deref() == Some(to.as_str()) {
                return Err(TransportError::Network("connection refused".to_string()));
            }
            self.sms.lock().push(to.as_str().to_string());
            Ok(())
        }

        async fn place_call(&self, _to: &PhoneNumber, _twiml: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn list_calls(&self) -> Result<Vec<crate::transport::CallRecord>, TransportError> {
            Ok(Vec::new())
        }
    }

    fn customers(n: usize) -> Vec<Customer> {
        (0..n)
            .map(|i| Customer {
                id: CustomerId::generate(),
                first_name: format!("Guest{}", i),
                last_name: "Example".to_string(),
                phone_number: PhoneNumber::new(format!("+1555200{:04}", i)),
                email: format!("guest{}@example.com", i),
                created_at: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_campaign_sends_two_messages_per_customer() {
        let transport = Arc::new(CountingTransport::new(None));
        let metrics = ReviewMetrics::new();
        let dispatcher = CampaignDispatcher::new(transport.clone(), metrics.clone(), 4);

        let report = dispatcher.start_campaign(customers(5)).await;

        assert_eq!(report.invited, 5);
        assert!(report.failures.is_empty());
        assert_eq!(transport.sms.lock().len(), 10);
        assert_eq!(metrics.invites_sent.get(), 5);
    }

    #[tokio::test]
    async fn test_per_customer_failure_reported_not_dropped() {
        let transport = Arc::new(CountingTransport::new(Some("+15552000001")));
        let metrics = ReviewMetrics::new();
        let dispatcher = CampaignDispatcher::new(transport.clone(), metrics.clone(), 4);

        let report = dispatcher.start_campaign(customers(3)).await;

        assert_eq!(report.invited, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phone_number, "+15552000001");
        // The other two customers still received both messages.
        assert_eq!(transport.sms.lock().len(), 4);
        assert_eq!(metrics.invites_sent.get(), 2);
    }

    #[tokio::test]
    async fn test_empty_campaign() {
        let transport = Arc::new(CountingTransport::new(None));
        let dispatcher = CampaignDispatcher::new(transport, ReviewMetrics::new(), 4);
        let report = dispatcher.start_campaign(Vec::new()).await;
        assert_eq!(report.invited, 0);
        assert!(report.failures.is_empty());
    }
}
