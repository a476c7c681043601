use crate::domain::model::ContainerContext;
use crate::utils::error::{DelegateError, Result};
use crate::utils::logger::LogFormat;
use crate::utils::validation::{validate_container_id, Validate};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_STATE_DIR: &str = "/var/lib/cni/libkv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CniCommand {
    #[value(name = "ADD")]
    Add,
    #[value(name = "DEL")]
    Del,
    #[value(name = "VERSION")]
    Version,
}

/// Invocation arguments. The container runtime passes these through the
/// `CNI_*` environment; flags exist for manual runs.
#[derive(Debug, Clone, Parser)]
#[command(name = "cni-libkv")]
#[command(about = "CNI meta plugin delegating to network configs stored in etcd or consul")]
pub struct CniArgs {
    #[arg(long, env = "CNI_COMMAND", value_enum)]
    pub command: CniCommand,

    #[arg(long, env = "CNI_CONTAINERID")]
    pub container_id: Option<String>,

    #[arg(long, env = "CNI_NETNS", default_value = "")]
    pub netns: String,

    #[arg(long, env = "CNI_IFNAME", default_value = "")]
    pub ifname: String,

    #[arg(long, env = "CNI_ARGS", default_value = "")]
    pub args: String,

    #[arg(long, env = "CNI_PATH", default_value = "")]
    pub path: String,

    /// Directory holding the per-container scratch records
    #[arg(long, env = "CNI_LIBKV_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    #[arg(long, env = "CNI_LIBKV_LOG_FORMAT", value_enum, default_value = "compact")]
    pub log_format: LogFormat,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CniArgs {
    pub fn container_context(&self) -> Result<ContainerContext> {
        let container_id = self
            .container_id
            .clone()
            .ok_or_else(|| DelegateError::InvalidEnvironment {
                message: "CNI_CONTAINERID is required for ADD and DEL".to_string(),
            })?;
        validate_container_id(&container_id)?;

        Ok(ContainerContext {
            container_id,
            netns: self.netns.clone(),
            ifname: self.ifname.clone(),
            args: self.args.clone(),
            plugin_path: std::env::split_paths(&self.path)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
        })
    }
}

impl Validate for CniArgs {
    fn validate(&self) -> Result<()> {
        match self.command {
            CniCommand::Version => Ok(()),
            CniCommand::Add | CniCommand::Del => self.container_context().map(|_| ()),
        }
    }
}
