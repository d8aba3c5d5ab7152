//! Review Gateway Microservice
//!
//! Webhook-driven review rewards conversation flow: invites customers
//! over SMS, interprets their replies with a small fixed state machine,
//! places the outbound review call, and tracks campaign metrics.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use solara_core::{
    DependencyStatus, HealthStatus, PhoneNumber, ReadinessStatus, Result, SolaraError,
    SolaraService,
};

pub mod auth;
pub mod campaign;
pub mod catalog;
pub mod cookies;
pub mod customers;
pub mod flow;
pub mod handlers;
pub mod metrics;
pub mod state;
pub mod transport;

use auth::RequestValidator;
use campaign::CampaignDispatcher;
use cookies::CookieSigner;
use customers::CustomerDirectory;
use flow::ReviewFlow;
use metrics::ReviewMetrics;
use state::MemoryConversationStore;
use transport::{TransportGateway, TwilioGateway};

/// Interval between expired-conversation sweeps (memory backend)
const STATE_CLEANUP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub http_bind: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: PhoneNumber,
    /// Externally reachable base URL; signature verification reconstructs
    /// `base_url + request path` byte-for-byte.
    pub base_url: String,
    pub status_callback_path: String,
    pub state_backend: StateBackendKind,
    pub state_ttl: Duration,
    pub call_delay: Duration,
    pub campaign_concurrency: usize,
    pub transport_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackendKind {
    Memory,
    Cookie,
}

impl ReviewConfig {
    pub fn from_env() -> Result<Self> {
        let account_sid = required_env("TWILIO_ACCOUNT_SID")?;
        let auth_token = required_env("TWILIO_AUTH_TOKEN")?;
        let from_number = PhoneNumber::new(required_env("TWILIO_PHONE_NUMBER")?);
        let base_url = required_env("BASE_URL")?.trim_end_matches('/').to_string();

        let state_backend = match std::env::var("STATE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .as_str()
        {
            "memory" => StateBackendKind::Memory,
            "cookie" => StateBackendKind::Cookie,
            other => {
                return Err(SolaraError::Config(format!(
                    "Invalid STATE_BACKEND: {}",
                    other
                )))
            }
        };

        Ok(Self {
            http_bind: std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            account_sid,
            auth_token,
            from_number,
            base_url,
            status_callback_path: "/call-event".to_string(),
            state_backend,
            state_ttl: Duration::from_secs(env_u64("STATE_TTL_SECS", 14400)),
            call_delay: Duration::from_secs(env_u64("CALL_DELAY_SECS", 8)),
            campaign_concurrency: env_u64("CAMPAIGN_CONCURRENCY", 16) as usize,
            transport_timeout: Duration::from_secs(env_u64("TRANSPORT_TIMEOUT_SECS", 15)),
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SolaraError::Config(format!("{} is required", name)))
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Conversation-state backing selected at startup
pub enum StateBackend {
    Memory(Arc<MemoryConversationStore>),
    Cookie(CookieSigner),
}

/// Shared application state behind the HTTP handlers
pub struct AppState {
    pub config: ReviewConfig,
    pub validator: RequestValidator,
    pub flow: ReviewFlow,
    pub dispatcher: CampaignDispatcher,
    pub transport: Arc<dyn TransportGateway>,
    pub directory: Arc<CustomerDirectory>,
    pub backend: StateBackend,
    pub metrics: ReviewMetrics,
}

impl AppState {
    /// Wire the production collaborators from configuration.
    pub fn from_config(config: ReviewConfig) -> Result<Self> {
        let metrics = ReviewMetrics::new();

        let transport: Arc<dyn TransportGateway> = Arc::new(TwilioGateway::new(
            config.account_sid.clone(),
            config.auth_token.clone(),
            config.from_number.clone(),
            format!("{}{}", config.base_url, config.status_callback_path),
            config.transport_timeout,
            metrics.sms_latency.clone(),
        )?);

        Ok(Self::with_transport(config, transport, metrics))
    }

    /// Wire the service around an arbitrary transport gateway.
    pub fn with_transport(
        config: ReviewConfig,
        transport: Arc<dyn TransportGateway>,
        metrics: ReviewMetrics,
    ) -> Self {
        let flow = ReviewFlow::new(transport.clone(), metrics.clone(), config.call_delay);
        let dispatcher = CampaignDispatcher::new(
            transport.clone(),
            metrics.clone(),
            config.campaign_concurrency,
        );
        let backend = match config.state_backend {
            StateBackendKind::Memory => {
                StateBackend::Memory(Arc::new(MemoryConversationStore::new(config.state_ttl)))
            }
            StateBackendKind::Cookie => {
                StateBackend::Cookie(CookieSigner::new(&config.auth_token, config.state_ttl))
            }
        };
        let validator = RequestValidator::new(config.auth_token.clone());

        Self {
            config,
            validator,
            flow,
            dispatcher,
            transport,
            directory: Arc::new(CustomerDirectory::new()),
            backend,
            metrics,
        }
    }
}

/// Review Gateway service
pub struct ReviewGatewayService {
    app: Arc<AppState>,
    start_time: std::time::Instant,
}

impl ReviewGatewayService {
    pub fn new() -> Result<Self> {
        let config = ReviewConfig::from_env()?;
        let app = Arc::new(AppState::from_config(config)?);
        Ok(Self {
            app,
            start_time: std::time::Instant::now(),
        })
    }
}

#[async_trait::async_trait]
impl SolaraService for ReviewGatewayService {
    fn service_id(&self) -> &'static str {
        "review-gateway"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    async fn ready(&self) -> ReadinessStatus {
        ReadinessStatus {
            ready: true,
            dependencies: vec![DependencyStatus {
                name: "twilio-api".to_string(),
                available: true,
                latency_ms: None,
            }],
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Review Gateway");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(
            http = %self.app.config.http_bind,
            backend = ?self.app.config.state_backend,
            "Starting Review Gateway server"
        );

        if let StateBackend::Memory(store) = &self.app.backend {
            let store = store.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(STATE_CLEANUP_INTERVAL_SECS));
                loop {
                    interval.tick().await;
                    store.cleanup_expired();
                }
            });
        }

        let router = handlers::router(self.app.clone());
        let listener = tokio::net::TcpListener::bind(&self.app.config.http_bind).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
