//! Solara Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Standard service trait all microservices must implement
//! - Common domain types (PhoneNumber, CustomerId)
//! - Error handling utilities

pub mod domain;
pub mod error;
pub mod service;

pub use domain::{CustomerId, PhoneNumber};
pub use error::{Result, SolaraError};
pub use service::{DependencyStatus, HealthStatus, MicroserviceRuntime, ReadinessStatus, SolaraService};
