//! molopt Core - service layer around the resident-model cache.
//!
//! This crate provides:
//! - Layered configuration and logging setup
//! - The synchronous optimization path ([`MolecularOptimizer`])
//! - The asynchronous job queue ([`JobQueue`])
//! - Service lifecycle ([`AppState`])
//!
//! # Example
//!
//! ```rust,no_run
//! use molopt_core::{AppState, Backend, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> molopt_core::Result<()> {
//!     let config = ServiceConfig::load(None)?;
//!     let state = AppState::init(config, Backend::reference()).await?;
//!     let report = state
//!         .optimizer()
//!         .optimize_identifier("CCO", None, &Default::default())
//!         .await?;
//!     println!("{}", report.xyz);
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod optimizer;
pub mod state;
pub mod xyz;

pub use config::ServiceConfig;
pub use error::{CoreError, Result};
pub use jobs::{JobId, JobQueue, JobRequest, JobState, JobStatus, RetryPolicy};
pub use logging::LogFormat;
pub use optimizer::{BatchItem, BatchReport, EnergyReport, MolecularOptimizer, OptimizationReport};
pub use state::{AppState, Backend, Readiness, ReadinessStatus};
pub use xyz::{parse_xyz, structure_to_xyz};
