//! Availability monitoring and self-healing for a single supervised service.
//!
//! Server side: probe a health endpoint, count consecutive failures and
//! restart the supervised process once per failure episode. Client side:
//! retry failing calls with backoff, classify errors and track
//! online/offline connectivity.

// Supervisor side
pub mod health;
pub mod supervisor;

// Client side
pub mod connectivity;
pub mod resilience;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::SentinelConfig;
pub use connectivity::ConnectivityMonitor;
pub use health::HealthMonitor;
pub use lifecycle::Shutdown;
pub use resilience::ResilientClient;
