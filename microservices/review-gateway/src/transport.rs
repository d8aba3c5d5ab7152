//! Transport gateway
//!
//! The external SMS/voice capability the conversation flow delegates all
//! real-world communication to. `TwilioGateway` implements the trait
//! against the Twilio 2010-04-01 REST API; provider failures surface as
//! structured `TransportError::Api` values rather than opaque strings.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

use solara_core::{PhoneNumber, SolaraError};
use solara_telemetry::Histogram;

/// One entry of the provider's call log
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub sid: String,
    pub to: String,
    pub date_created: String,
    pub duration: String,
}

/// Sends one SMS or places one voice call per invocation.
#[async_trait]
pub trait TransportGateway: Send + Sync {
    async fn send_sms(&self, to: &PhoneNumber, body: &str) -> Result<(), TransportError>;

    /// Place a call that plays `twiml` and reports its completion to the
    /// configured status-callback URL.
    async fn place_call(&self, to: &PhoneNumber, twiml: &str) -> Result<(), TransportError>;

    async fn list_calls(&self) -> Result<Vec<CallRecord>, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Provider error {code}: {message}")]
    Api {
        code: i64,
        message: String,
        status: u16,
        more_info: Option<String>,
        details: Option<serde_json::Value>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct TwilioApiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    more_info: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CallsPage {
    #[serde(default)]
    calls: Vec<CallResource>,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    to: String,
    #[serde(default)]
    date_created: String,
    #[serde(default)]
    duration: String,
}

/// Twilio REST client
pub struct TwilioGateway {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: PhoneNumber,
    status_callback_url: String,
    status_callback_method: String,
    sms_latency: Histogram,
}

impl TwilioGateway {
    pub fn new(
        account_sid: String,
        auth_token: String,
        from_number: PhoneNumber,
        status_callback_url: String,
        request_timeout: Duration,
        sms_latency: Histogram,
    ) -> solara_core::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SolaraError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: "https://api.twilio.com/2010-04-01".to_string(),
            account_sid,
            auth_token,
            from_number,
            status_callback_url,
            status_callback_method: "POST".to_string(),
            sms_latency,
        })
    }

    async fn api_error(response: reqwest::Response) -> TransportError {
        let status = response.status().as_u16();
        match response.json::<TwilioApiError>().await {
            Ok(err) => TransportError::Api {
                code: err.code,
                message: err.message,
                status,
                more_info: err.more_info,
                details: err.details,
            },
            Err(e) => TransportError::Parse(e.to_string()),
        }
    }
}

#[async_trait]
impl TransportGateway for TwilioGateway {
    async fn send_sms(&self, to: &PhoneNumber, body: &str) -> Result<(), TransportError> {
        let url = format!("{}/Accounts/{}/Messages.json", self.api_base, self.account_sid);
        let params = [
            ("To", to.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", body),
        ];

        debug!(to = %to, from = %self.from_number, body = body, "SMS message parameters");

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let err = Self::api_error(response).await;
            if let TransportError::Api {
                code,
                message,
                status,
                more_info,
                ..
            } = &err
            {
                tracing::error!(
                    code = *code,
                    message = %message,
                    status = *status,
                    more_info = more_info.as_deref().unwrap_or(""),
                    "Failed to send SMS message"
                );
            }
            return Err(err);
        }

        let latency = start.elapsed().as_secs_f64();
        self.sms_latency.record(latency);
        debug!(latency, "SMS message sent successfully");
        Ok(())
    }

    async fn place_call(&self, to: &PhoneNumber, twiml: &str) -> Result<(), TransportError> {
        let url = format!("{}/Accounts/{}/Calls.json", self.api_base, self.account_sid);
        let params = [
            ("To", to.as_str()),
            ("From", self.from_number.as_str()),
            ("StatusCallback", self.status_callback_url.as_str()),
            ("StatusCallbackEvent", "completed"),
            ("StatusCallbackMethod", self.status_callback_method.as_str()),
            ("Twiml", twiml),
        ];

        debug!(to = %to, "Placing review call");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    async fn list_calls(&self) -> Result<Vec<CallRecord>, TransportError> {
        let url = format!("{}/Accounts/{}/Calls.json", self.api_base, self.account_sid);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let page: CallsPage = response
            .json()
            .await
            .map_err(|e| TransportError::Parse(e.to_string()))?;

        Ok(page
            .calls
            .into_iter()
            .map(|c| CallRecord {
                sid: c.sid,
                to: c.to,
                date_created: c.date_created,
                duration: c.duration,
            })
            .collect())
    }
}
