//! Type definitions for extsync configuration, plans and bookkeeping

mod extension_types;
mod runtime_config;
mod state_types;

pub use extension_types::*;
pub use runtime_config::*;
pub use state_types::*;
