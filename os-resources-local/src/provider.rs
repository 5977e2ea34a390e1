use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use os_resource::framework::ResourceProvider;
use os_resource::schema::v0;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

use crate::text_file::{ReadOutcome, ReconcileError, Reconciler, Storage, TextFile};

/// Name of this provider.
pub const PROVIDER_TYPE_NAME: &str = "os";

/// The text file resource type.
pub const TEXT_FILE: &str = "os_text_file";

/// Earlier name of [`TEXT_FILE`], still accepted.
pub const TEXT_FILE_LEGACY: &str = "os_server";

/// Exposes the text file [`Reconciler`] as a resource provider.
pub struct OperatingSystemProvider<S = crate::text_file::LocalFilesystem> {
    reconciler: Reconciler<S>,
}

impl OperatingSystemProvider {
    pub fn new() -> Self {
        OperatingSystemProvider {
            reconciler: Reconciler::local(),
        }
    }
}

impl Default for OperatingSystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Storage> OperatingSystemProvider<S> {
    pub fn with_reconciler(reconciler: Reconciler<S>) -> Self {
        OperatingSystemProvider { reconciler }
    }
}

/// Only `path` is needed to find an existing file; whatever else the
/// orchestrator remembers is ignored.
#[derive(Debug, Deserialize)]
struct Location {
    path: PathBuf,
}

#[async_trait::async_trait]
impl<S: Storage + 'static> ResourceProvider for OperatingSystemProvider<S> {
    fn metadata(&self) -> v0::ProviderMetadata {
        provider_metadata()
    }

    async fn create(
        &self,
        request: v0::CreateResourceRequest,
    ) -> Result<v0::CreateResourceResponse> {
        check_type(&request.type_)?;
        let desired: TextFile = parse_properties(&request.input_properties.0)?;
        let span = tracing::info_span!(
            "create",
            resource_type = %request.type_,
            path = %desired.path.display()
        );
        let observed = span.in_scope(|| self.reconciler.create(&desired)).map_err(reject)?;
        Ok(v0::CreateResourceResponse {
            output_properties: to_output_properties(&observed)?,
        })
    }

    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse> {
        check_type(&request.resource.type_)?;
        let location: Location = parse_properties(last_known(&request.resource))?;
        let span = tracing::info_span!(
            "read",
            resource_type = %request.resource.type_,
            path = %location.path.display()
        );
        let outcome = span.in_scope(|| self.reconciler.read(&location.path)).map_err(reject)?;
        let output_properties = match outcome {
            ReadOutcome::Present(file) => Some(to_output_properties(&file)?),
            ReadOutcome::Absent => {
                tracing::info!(path = %location.path.display(), "file no longer exists");
                None
            }
        };
        Ok(v0::ReadResourceResponse { output_properties })
    }

    async fn update(
        &self,
        request: v0::UpdateResourceRequest,
    ) -> Result<v0::UpdateResourceResponse> {
        check_type(&request.resource.type_)?;
        let desired: TextFile = parse_properties(&request.input_properties.0)?;
        let current: TextFile = parse_properties(last_known(&request.resource))?;
        let span = tracing::info_span!(
            "update",
            resource_type = %request.resource.type_,
            path = %desired.path.display()
        );
        let observed = span
            .in_scope(|| self.reconciler.update(&desired, &current))
            .map_err(reject)?;
        Ok(v0::UpdateResourceResponse {
            output_properties: to_output_properties(&observed)?,
        })
    }

    async fn delete(
        &self,
        request: v0::DeleteResourceRequest,
    ) -> Result<v0::DeleteResourceResponse> {
        check_type(&request.resource.type_)?;
        let location: Location = parse_properties(last_known(&request.resource))?;
        let span = tracing::info_span!(
            "delete",
            resource_type = %request.resource.type_,
            path = %location.path.display()
        );
        span.in_scope(|| self.reconciler.delete(&location.path))
            .map_err(reject)?;
        Ok(v0::DeleteResourceResponse {})
    }
}

pub fn provider_metadata() -> v0::ProviderMetadata {
    let string_attribute = |description: &str| v0::AttributeSchema {
        description: description.to_string(),
        type_: v0::AttributeType::String,
        required: true,
    };
    let text_file = v0::ResourceSchema {
        description: "Manages a local text file.".to_string(),
        attributes: BTreeMap::from([
            (
                "path".to_string(),
                string_attribute("The absolute path to the file."),
            ),
            (
                "content".to_string(),
                string_attribute("The content to write in the file."),
            ),
        ]),
    };
    v0::ProviderMetadata {
        type_name: PROVIDER_TYPE_NAME.to_string(),
        resources: BTreeMap::from([(TEXT_FILE.to_string(), text_file)]),
    }
}

/// The properties describing a resource as it was last seen: its outputs if
/// it has any, otherwise its inputs.
fn last_known(resource: &v0::ExtantResource) -> &Map<String, Value> {
    match &resource.output_properties {
        Some(outputs) => &outputs.0,
        None => &resource.input_properties.0,
    }
}

fn check_type(type_: &v0::ResourceType) -> Result<()> {
    match type_.as_str() {
        TEXT_FILE | TEXT_FILE_LEGACY => Ok(()),
        t => Err(reject(ReconcileError::InvalidInput {
            location: None,
            reason: format!("unknown resource type: {}", t),
        })),
    }
}

fn parse_properties<T: DeserializeOwned>(properties: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(properties.clone())).map_err(|e| {
        let location = properties
            .get("path")
            .and_then(Value::as_str)
            .map(PathBuf::from);
        reject(ReconcileError::InvalidInput {
            location,
            reason: format!("could not decode properties: {}", e),
        })
    })
}

fn to_output_properties(file: &TextFile) -> Result<v0::OutputProperties> {
    match serde_json::to_value(file)? {
        Value::Object(o) => Ok(v0::OutputProperties(o)),
        _ => anyhow::bail!("Expected object as output"),
    }
}

/// Hand a reconciliation failure to the framework in its wire form, so the
/// orchestrator receives the kind along with location and cause.
fn reject(e: ReconcileError) -> anyhow::Error {
    anyhow::Error::new(v0::ResourceError::from(e))
}
