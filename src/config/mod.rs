//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (HEALTH_CHECK_URL, MAX_FAILURES, ...)
//!     → validation.rs (semantic checks)
//!     → SentinelConfig (validated, immutable)
//!     → cloned into each subsystem at construction
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Environment wins over the file so deployments can override one knob
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AdminConfig;
pub use schema::ClientConfig;
pub use schema::ConnectivityConfig;
pub use schema::MonitorConfig;
pub use schema::ObservabilityConfig;
pub use schema::RestartConfig;
pub use schema::RetryConfig;
pub use schema::SentinelConfig;
pub use schema::TimeoutConfig;
