//! protoc-gen-stencil library
//!
//! A protoc plugin that renders user-supplied templates against the
//! descriptors of a `CodeGeneratorRequest`. Templates decide which output
//! files exist and what goes in them; the plugin supplies the descriptor
//! model, a flat index of every named type and a library of helpers.

#![deny(warnings)]
#![deny(missing_docs)]

pub mod case;
pub mod descriptor;
pub mod generator;
pub mod params;
pub mod template;

use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use thiserror::Error;

/// Log filter used when `STENCIL_LOG` is unset
///
/// Covers every target of the crate, template `log` output included.
pub const DEFAULT_LOG_FILTER: &str = "protoc_gen_stencil=info";

/// Errors that abort a generation run
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Nothing was read from standard input
    #[error("no input provided")]
    NoInput,

    /// Failed to decode the protobuf request
    #[error("error decoding request: {0}")]
    DecodeError(String),

    /// Malformed plugin parameter string
    #[error("invalid parameter: {0}")]
    ParamsError(String),

    /// A template could not be read or parsed
    #[error("error parsing template(s): {0}")]
    TemplateLoadError(String),

    /// A template failed while rendering, `error(...)` included
    #[error("{0}")]
    RenderError(String),

    /// Invalid plugin configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Render the request's templates
///
/// This is the main entry point for the plugin.
pub fn generate(request: CodeGeneratorRequest) -> Result<CodeGeneratorResponse, GeneratorError> {
    generator::generate(request)
}

/// Decode a serialized request and render it
pub fn generate_from_bytes(bytes: &[u8]) -> Result<CodeGeneratorResponse, GeneratorError> {
    generator::generate_from_bytes(bytes)
}
