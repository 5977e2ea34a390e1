use anyhow::{bail, Context, Result};
use jsonrpsee::{async_client::Client, core::ClientError};
use os_resource::{
    rpc::{resource_error_from_object, ResourceProviderRpcClient as _},
    schema::v0,
};
use serde_json::{Map, Value};
use tokio::process;

mod rpc;

pub struct ResourceProviderConfig {
    pub provider_executable: String,
    pub provider_args: Vec<String>,
}

/// A running resource provider process and the JSON-RPC connection to it.
///
/// Typed failures reported by the provider are returned as a
/// [`v0::ResourceError`] inside the [`anyhow::Error`], so callers can
/// `downcast_ref` to tell them apart.
pub struct ResourceProviderClient {
    provider_config: ResourceProviderConfig,
    process: process::Child,
    rpc: Client,
}

impl ResourceProviderClient {
    pub async fn launch(provider_config: ResourceProviderConfig) -> Result<Self> {
        let mut process = process::Command::new(&provider_config.provider_executable)
            .args(&provider_config.provider_args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Could not spawn provider process {}",
                    provider_config.provider_executable
                )
            })?;

        let rpc = rpc::build_rpc_client_from_child(&mut process)?;
        tracing::debug!(
            executable = %provider_config.provider_executable,
            "launched resource provider"
        );

        Ok(ResourceProviderClient {
            provider_config,
            process,
            rpc,
        })
    }

    pub async fn metadata(&self) -> Result<v0::ProviderMetadata> {
        self.rpc.metadata().await.map_err(remote_error)
    }

    /// Create a resource and return its output properties.
    pub async fn create(&self, type_: &str, inputs: &Map<String, Value>) -> Result<Map<String, Value>> {
        let response = self
            .rpc
            .create(type_.to_string(), inputs.clone())
            .await
            .map_err(remote_error)?;
        Ok(response.output_properties.0)
    }

    /// Refresh a resource. `None` means the resource no longer exists.
    pub async fn read(&self, resource: &v0::ExtantResource) -> Result<Option<Map<String, Value>>> {
        let response = self
            .rpc
            .read(resource.clone())
            .await
            .map_err(remote_error)?;
        Ok(response.output_properties.map(|o| o.0))
    }

    pub async fn update(
        &self,
        resource: &v0::ExtantResource,
        inputs: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let response = self
            .rpc
            .update(resource.clone(), inputs.clone())
            .await
            .map_err(remote_error)?;
        Ok(response.output_properties.0)
    }

    pub async fn delete(&self, resource: &v0::ExtantResource) -> Result<()> {
        self.rpc
            .delete(resource.clone())
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    /// Close the connection and wait for the provider to exit.
    pub async fn shutdown(self) -> Result<()> {
        let ResourceProviderClient {
            provider_config,
            mut process,
            rpc,
        } = self;
        // Dropping the client closes the provider's stdin, which ends its loop.
        drop(rpc);
        let status = process.wait().await.with_context(|| {
            format!(
                "Could not wait for provider process {}",
                provider_config.provider_executable
            )
        })?;
        if !status.success() {
            bail!(
                "Provider process {} exited with {}",
                provider_config.provider_executable,
                status
            );
        }
        Ok(())
    }
}

fn remote_error(error: ClientError) -> anyhow::Error {
    match error {
        ClientError::Call(object) => match resource_error_from_object(&object) {
            Some(e) => anyhow::Error::new(e),
            None => anyhow::anyhow!(
                "Resource provider error {}: {}{}",
                object.code(),
                object.message(),
                object
                    .data()
                    .map(|d| format!(" ({})", d.get()))
                    .unwrap_or_default()
            ),
        },
        e => anyhow::Error::new(e).context("Could not communicate with resource provider"),
    }
}
