//! REST transport for the MaaS tier toolbox

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod router;
pub mod server;

pub use config::Config;
pub use router::{build_router, AppState};
