//! Review Gateway entry point

use std::sync::Arc;

use review_gateway::ReviewGatewayService;
use solara_core::{MicroserviceRuntime, Result, SolaraError};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = solara_telemetry::init("review-gateway")
        .map_err(|e| SolaraError::Config(e.to_string()))?;

    tracing::info!("Starting Review Gateway microservice");

    let service = Arc::new(ReviewGatewayService::new()?);
    MicroserviceRuntime::run(service).await
}
