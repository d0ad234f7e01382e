//! Question planning and result profiling for tabular datasets.
//!
//! A free-text question is planned into a bounded [`models::AnalysisRequest`],
//! the rows a playbook returns for it are profiled by the structure analyzer,
//! and the profile drives chart selection and the textual analysis.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use error::AppError;
pub use models::{AnalysisRequest, Intent, Mode, Playbook, Row, SchemaInfo};
