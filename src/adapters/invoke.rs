use crate::domain::model::{CniError, ContainerContext, DelegationResult};
use crate::domain::ports::Delegator;
use crate::utils::error::{DelegateError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const CMD_ADD: &str = "ADD";
const CMD_DEL: &str = "DEL";

/// Runs child plugins as processes found on the context's `CNI_PATH`.
#[derive(Debug, Clone, Default)]
pub struct ExecDelegator;

impl ExecDelegator {
    pub fn new() -> Self {
        Self
    }

    pub fn find_plugin(plugin: &str, search_path: &[PathBuf]) -> Result<PathBuf> {
        let not_found = || DelegateError::PluginNotFound {
            plugin: plugin.to_string(),
            search_path: search_path
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(":"),
        };

        if plugin.is_empty() || plugin.contains('/') || plugin == "." || plugin == ".." {
            return Err(not_found());
        }

        search_path
            .iter()
            .map(|dir| dir.join(plugin))
            .find(|candidate| candidate.is_file())
            .ok_or_else(not_found)
    }

    async fn exec(
        &self,
        command: &'static str,
        plugin: &str,
        config: &[u8],
        context: &ContainerContext,
    ) -> Result<Vec<u8>> {
        let binary = Self::find_plugin(plugin, &context.plugin_path)?;
        let failed = |message: String| DelegateError::DelegationFailed {
            command,
            plugin: plugin.to_string(),
            message,
        };

        let cni_path =
            std::env::join_paths(&context.plugin_path).map_err(|e| failed(e.to_string()))?;

        tracing::debug!("Executing {} {} ({} bytes of config)", binary.display(), command, config.len());
        let mut child = Command::new(&binary)
            .env("CNI_COMMAND", command)
            .env("CNI_CONTAINERID", &context.container_id)
            .env("CNI_NETNS", &context.netns)
            .env("CNI_IFNAME", &context.ifname)
            .env("CNI_ARGS", &context.args)
            .env("CNI_PATH", cni_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(format!("cannot execute {}: {}", binary.display(), e)))?;

        let stdin = child.stdin.take();
        let write_config = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(config).await {
                    // Plugins may exit without reading their input.
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };

        let (written, output) = tokio::join!(write_config, child.wait_with_output());
        let output = output.map_err(|e| failed(e.to_string()))?;
        written.map_err(|e| failed(format!("writing config to stdin: {}", e)))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(plugin_error(plugin, &binary, &output))
        }
    }
}

fn plugin_error(plugin: &str, binary: &Path, output: &Output) -> DelegateError {
    if let Ok(err) = serde_json::from_slice::<CniError>(&output.stdout) {
        let message = match err.details {
            Some(details) if !details.is_empty() => format!("{}; {}", err.msg, details),
            _ => err.msg,
        };
        return DelegateError::PluginFailed {
            plugin: plugin.to_string(),
            code: Some(err.code),
            message,
        };
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    DelegateError::PluginFailed {
        plugin: plugin.to_string(),
        code: None,
        message: if stderr.is_empty() {
            format!("{} exited with {}", binary.display(), output.status)
        } else {
            stderr
        },
    }
}

#[async_trait]
impl Delegator for ExecDelegator {
    async fn attach(
        &self,
        plugin: &str,
        config: &[u8],
        context: &ContainerContext,
    ) -> Result<DelegationResult> {
        let stdout = self.exec(CMD_ADD, plugin, config, context).await?;
        DelegationResult::from_bytes(stdout).map_err(|e| DelegateError::DelegationFailed {
            command: CMD_ADD,
            plugin: plugin.to_string(),
            message: format!("invalid result: {}", e),
        })
    }

    async fn detach(&self, plugin: &str, config: &[u8], context: &ContainerContext) -> Result<()> {
        self.exec(CMD_DEL, plugin, config, context).await?;
        Ok(())
    }
}
