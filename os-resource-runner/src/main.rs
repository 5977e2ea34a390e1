//! The os-resource-runner executable
//!
//! Drives a resource provider through its lifecycle operations from the
//! command line, without an orchestrator.
use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand};
use os_resource::schema::v0;
use os_resource_runner::{ResourceProviderClient, ResourceProviderConfig};
use serde_json::{Map, Value};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        Commands::Metadata { provider } => {
            let client = launch(provider).await?;
            let metadata = client.metadata().await?;
            client.shutdown().await?;
            print_json(&metadata)?;
        }
        Commands::Create { provider, inputs } => {
            let inputs = inputs.gather()?;
            let client = launch(provider).await?;
            let outputs = client.create(&provider.resource_type, &inputs).await?;
            client.shutdown().await?;
            print_json(&outputs)?;
        }
        Commands::Read {
            provider,
            inputs,
            outputs_json,
        } => {
            let resource = extant(provider, inputs.gather()?, outputs_json)?;
            let client = launch(provider).await?;
            let outputs = client.read(&resource).await?;
            client.shutdown().await?;
            match outputs {
                Some(outputs) => print_json(&outputs)?,
                None => {
                    eprintln!("resource no longer exists");
                    print_json(&Value::Null)?;
                }
            }
        }
        Commands::Update {
            provider,
            inputs,
            previous_inputs_json,
            outputs_json,
        } => {
            let previous = parse_object(previous_inputs_json, "--previous-inputs-json")?;
            let resource = extant(provider, previous, outputs_json)?;
            let inputs = inputs.gather()?;
            let client = launch(provider).await?;
            let outputs = client.update(&resource, &inputs).await?;
            client.shutdown().await?;
            print_json(&outputs)?;
        }
        Commands::Delete {
            provider,
            inputs,
            outputs_json,
        } => {
            let resource = extant(provider, inputs.gather()?, outputs_json)?;
            let client = launch(provider).await?;
            client.delete(&resource).await?;
            client.shutdown().await?;
        }
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
        }
    }

    Ok(())
}

async fn launch(provider: &ProviderArgs) -> Result<ResourceProviderClient> {
    ResourceProviderClient::launch(ResourceProviderConfig {
        provider_executable: provider.provider_exe.clone(),
        provider_args: vec![],
    })
    .await
}

fn extant(
    provider: &ProviderArgs,
    inputs: Map<String, Value>,
    outputs_json: &Option<String>,
) -> Result<v0::ExtantResource> {
    let output_properties = match outputs_json {
        Some(json) => Some(v0::OutputProperties(parse_object(json, "--outputs-json")?)),
        None => None,
    };
    Ok(v0::ExtantResource {
        type_: v0::ResourceType(provider.resource_type.clone()),
        input_properties: v0::InputProperties(inputs),
        output_properties,
    })
}

fn parse_object(json: &str, flag: &str) -> Result<Map<String, Value>> {
    serde_json::from_str::<Map<String, Value>>(json)
        .with_context(|| format!("failed to parse value of {}", flag))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Simple program to run os resources
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct ProviderArgs {
    /// The executable that implements the resource operations
    #[arg(long)]
    provider_exe: String,

    /// The type of resource: an identifier recognized by the resource provider
    #[arg(long("type"))]
    resource_type: String,
}

#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// The (whole) JSON input properties for the resource
    ///
    /// This is a JSON object with the values needed to create the resource.
    /// The structure of this object is defined by the resource provider behavior.
    #[arg(long("inputs-json"))]
    input_properties_json: Option<String>,

    /// An individual input property for the resource, in JSON format
    #[arg(long("input-json"),short('j'),number_of_values = 2, value_names = &["NAME", "JSON"])]
    input_property_json: Vec<String>,

    /// An individual input property for the resource, as a raw string.
    ///
    /// This is equivalent to `--input-json NAME JSON` if JSON is the JSON string formatting of STR.
    #[arg(long("input-str"),short('s'),number_of_values = 2, value_names = &["NAME", "STR"])]
    input_property_str: Vec<String>,
}

impl InputArgs {
    /// Collect all input flags into one object.
    fn gather(&self) -> Result<Map<String, Value>> {
        // NOTE (loss of ordering):
        //
        // clap_derive appears incapable of preserving the order of flags,
        // as it rejects a Vec of enums that would allow for this. This
        // means that we can't tell which input property was specified last,
        // and so we can't make later inputs override earlier ones. We reject
        // duplicate inputs instead, which keeps overriding possible as a
        // non-breaking change later.
        let mut inputs = match &self.input_properties_json {
            Some(json_string) => {
                serde_json::from_str::<HashMap<String, Value>>(json_string.as_str())
                    .context("failed to parse value of --inputs-json")?
            }
            None => HashMap::new(),
        };

        for pair in self.input_property_json.chunks(2) {
            let [k, v] = pair else {
                bail!("--input-json takes a NAME and a JSON value");
            };
            if inputs.contains_key(k) {
                // No overriding; see note "loss of ordering"
                bail!("duplicate input: {}", k);
            }
            inputs.insert(
                k.clone(),
                serde_json::from_str(v.as_str())
                    .with_context(|| format!("failed to parse JSON value for input: {}", k))?,
            );
        }
        for pair in self.input_property_str.chunks(2) {
            let [k, v] = pair else {
                bail!("--input-str takes a NAME and a string");
            };
            if inputs.contains_key(k) {
                // No overriding; see note "loss of ordering"
                bail!("duplicate input: {}", k);
            }
            inputs.insert(k.clone(), Value::String(v.clone()));
        }

        Ok(inputs.into_iter().collect())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the provider's name and resource schemas
    Metadata {
        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Create a resource
    Create {
        #[command(flatten)]
        provider: ProviderArgs,

        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Read the current state of a resource
    ///
    /// Prints `null` if the resource no longer exists.
    Read {
        #[command(flatten)]
        provider: ProviderArgs,

        #[command(flatten)]
        inputs: InputArgs,

        /// The output properties last reported for the resource
        #[arg(long("outputs-json"))]
        outputs_json: Option<String>,
    },

    /// Update a resource to new input properties
    Update {
        #[command(flatten)]
        provider: ProviderArgs,

        #[command(flatten)]
        inputs: InputArgs,

        /// The input properties the resource currently has
        #[arg(long("previous-inputs-json"))]
        previous_inputs_json: String,

        /// The output properties last reported for the resource
        #[arg(long("outputs-json"))]
        outputs_json: Option<String>,
    },

    /// Delete a resource
    Delete {
        #[command(flatten)]
        provider: ProviderArgs,

        #[command(flatten)]
        inputs: InputArgs,

        /// The output properties last reported for the resource
        #[arg(long("outputs-json"))]
        outputs_json: Option<String>,
    },

    /// Generate markdown documentation for os-resource-runner
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for os-resource-runner
    #[command(hide = true)]
    GenerateMan,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("os-resource-runner").chain(args.iter().copied()))
            .unwrap()
    }

    fn create_inputs(args: &[&str]) -> Result<Map<String, Value>> {
        match parse(args).command {
            Commands::Create { inputs, .. } => inputs.gather(),
            c => panic!("unexpected command {:?}", c),
        }
    }

    #[test]
    fn inputs_from_all_flags() {
        let inputs = create_inputs(&[
            "create",
            "--provider-exe",
            "p",
            "--type",
            "os_text_file",
            "--inputs-json",
            r#"{"path": "/tmp/a.txt"}"#,
            "--input-str",
            "content",
            "hello",
            "--input-json",
            "extra",
            "[1, 2]",
        ])
        .unwrap();
        assert_eq!(
            Value::Object(inputs),
            json!({ "path": "/tmp/a.txt", "content": "hello", "extra": [1, 2] })
        );
    }

    #[test]
    fn duplicate_inputs_are_rejected() {
        let err = create_inputs(&[
            "create",
            "--provider-exe",
            "p",
            "--type",
            "os_text_file",
            "--inputs-json",
            r#"{"content": "a"}"#,
            "--input-str",
            "content",
            "b",
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate input: content");
    }

    #[test]
    fn read_takes_outputs() {
        let args = parse(&[
            "read",
            "--provider-exe",
            "p",
            "--type",
            "os_text_file",
            "--input-str",
            "path",
            "/tmp/a.txt",
            "--outputs-json",
            r#"{"path": "/tmp/a.txt", "content": "x"}"#,
        ]);
        let Commands::Read {
            provider,
            inputs,
            outputs_json,
        } = args.command
        else {
            panic!("expected read");
        };
        let resource = extant(&provider, inputs.gather().unwrap(), &outputs_json).unwrap();
        assert_eq!(resource.type_.as_str(), "os_text_file");
        assert_eq!(
            resource.output_properties.map(|o| Value::Object(o.0)),
            Some(json!({ "path": "/tmp/a.txt", "content": "x" }))
        );
    }

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }
}
