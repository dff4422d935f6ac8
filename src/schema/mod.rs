//! # Schema Module
//!
//! Compiles the three validators every channel carries and runs them at
//! publish time.
//!
//! | Stage   | Source                                  | Formats | Coercion |
//! |---------|-----------------------------------------|---------|----------|
//! | params  | synthesized from channel `parameters`   | yes     | yes      |
//! | headers | message `headers`, `x-parser-*` removed | yes     | no       |
//! | body    | message `payload`                       | yes     | no       |
//!
//! Validators are compiled exactly once when the channel is built. Only the
//! first failing constraint is reported, as a [`ValidationError`] whose
//! `schema_path` points at the failing keyword.
//!
//! [`ValidationError`]: crate::error::ValidationError

pub mod coerce;
mod core;
pub mod sanitize;
#[cfg(test)]
mod tests;

pub use self::core::{params_schema, SchemaValidator};
