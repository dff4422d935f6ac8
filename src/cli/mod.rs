//! # CLI Module
//!
//! Command-line access to the loader and the publisher.
//!
//! ## Commands
//!
//! ### `inspect`
//!
//! List the outbound channels of a document with their parameters and servers:
//!
//! ```bash
//! asyncapi-pub inspect --spec asyncapi.yaml [--tag billing]
//! ```
//!
//! ### `publish`
//!
//! Load a document with the built-in plugins, validate one message and send it.
//! Only `http`/`https` servers are reachable from the command line; a document
//! whose channels use AMQP or Kafka fails to load with an unknown-protocol error.
//!
//! ```bash
//! asyncapi-pub publish \
//!     --spec asyncapi.yaml \
//!     --topic events/42 \
//!     --message '{"status":"started"}' \
//!     --header traceId=abc \
//!     --option priority=5
//! ```
//!
//! Header and option values are parsed as JSON when possible (`priority=5`
//! is the number 5) and kept as strings otherwise. The adapter results are
//! printed as a JSON array.
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use asyncapi_pub::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! run_cli(Cli::parse()).await?;
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{parse_key_val, run_cli, Cli, Commands};
