#[cfg(feature = "cli")]
pub mod cli;
pub mod libkv;

pub use libkv::{DelegatorConfig, LibKvConf};
