pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{CniArgs, CniCommand};

pub use adapters::{DirScratchStore, ExecDelegator, StoreRegistry};
pub use config::DelegatorConfig;
pub use core::engine::DelegationEngine;
pub use utils::error::{DelegateError, Result};
