//! assetflow: front-end asset build pipeline with watch mode, live reload
//! and API proxying.

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod utils;

pub use crate::core::models::{BuildConfig, BuildMode, PathSet, ProxyRule};
pub use crate::core::services::Orchestrator;
pub use crate::utils::{FlowError, Result};
