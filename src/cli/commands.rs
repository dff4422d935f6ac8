use crate::plugins::PluginRegistry;
use crate::publisher::{LoadOptions, Publisher};
use crate::spec::{build_channels, fail_if_issues, load_document};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Command-line interface for asyncapi-pub
#[derive(Parser)]
#[command(name = "asyncapi-pub")]
#[command(about = "Validate and publish messages described by an AsyncAPI document", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every outbound channel with its parameters and servers
    Inspect {
        /// Path to the AsyncAPI document (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Only list channels whose operation carries this tag
        #[arg(short, long, env = "ASYNCAPI_PUB_TAG")]
        tag: Option<String>,
    },
    /// Validate a message and publish it through the built-in plugins
    Publish {
        /// Path to the AsyncAPI document (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Concrete topic, e.g. `events/42`
        #[arg(long)]
        topic: String,

        /// Message body; JSON text, or sent as a plain string if it is not JSON
        #[arg(short, long)]
        message: String,

        /// Message header as `name=value` (repeatable)
        #[arg(long = "header", value_parser = parse_key_val)]
        headers: Vec<(String, String)>,

        /// Per-send adapter option as `name=value` (repeatable)
        #[arg(long = "option", value_parser = parse_key_val)]
        options: Vec<(String, String)>,

        /// Only load channels whose operation carries this tag
        #[arg(short, long, env = "ASYNCAPI_PUB_TAG")]
        tag: Option<String>,
    },
}

/// Parse a `name=value` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}

/// JSON if it parses, otherwise the raw string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn to_map(pairs: &[(String, String)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.clone(), parse_value(v)))
        .collect()
}

/// Execute a parsed command line
///
/// # Errors
///
/// Returns an error if the document cannot be loaded, a channel cannot be
/// built, or the publish is rejected.
pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Inspect { spec, tag } => {
            let doc = load_document(&spec)?;
            let (channels, issues) = build_channels(&doc, tag.as_deref())?;
            fail_if_issues(&issues)?;

            println!("{} {} (AsyncAPI {})", doc.title, doc.version, doc.asyncapi);
            for server in &doc.servers {
                println!("  server {} {} {}", server.name, server.protocol, server.url);
            }
            for channel in &channels {
                println!("{}", channel.name);
                for param in &channel.parameters {
                    println!(
                        "    param {}: {}",
                        param.name,
                        param.schema_type().unwrap_or("any")
                    );
                }
                println!("    servers: {}", channel.servers.join(", "));
                if !channel.tags.is_empty() {
                    println!("    tags: {}", channel.tags.join(", "));
                }
            }
            Ok(())
        }
        Commands::Publish {
            spec,
            topic,
            message,
            headers,
            options,
            tag,
        } => {
            let publisher = Publisher::new(PluginRegistry::builtin());
            let load = LoadOptions {
                tag,
                ..LoadOptions::default()
            };
            publisher
                .load_api(spec.as_path(), load)
                .await
                .with_context(|| format!("failed to load {}", spec.display()))?;

            let outcome = publisher
                .publish(&topic, parse_value(&message), to_map(&headers), to_map(&options))
                .await;
            publisher.stop(true).await?;

            let results = outcome?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
    }
}
