//! protoc-gen-stencil - A protoc plugin that renders templates against descriptors
//!
//! This binary reads a CodeGeneratorRequest from stdin and writes a
//! CodeGeneratorResponse to stdout, following the protoc plugin protocol.

use prost::Message;
use prost_types::compiler::CodeGeneratorResponse;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "STENCIL_LOG";

const RETRY_START: Duration = Duration::from_millis(50);
const RETRY_MAX: Duration = Duration::from_millis(500);

fn main() {
    init_logging();

    if let Err(e) = run() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

/// Log to stderr; stdout carries the response
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(protoc_gen_stencil::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    let response = match io::stdin().read_to_end(&mut buf) {
        Ok(_) => protoc_gen_stencil::generate_from_bytes(&buf).unwrap_or_else(|e| error_response(e.to_string())),
        Err(e) => error_response(format!("error reading from standard input: {}", e)),
    };

    if let Some(ref err) = response.error {
        tracing::error!("error in response: {}", err);
    }
    tracing::debug!(files = response.file.len(), "writing response");

    let mut out = Vec::new();
    response.encode(&mut out)?;
    write_with_retry(&mut io::stdout().lock(), &out);

    Ok(())
}

fn error_response(error: String) -> CodeGeneratorResponse {
    CodeGeneratorResponse {
        error: Some(error),
        ..Default::default()
    }
}

/// Write everything, backing off between failed attempts
///
/// Gives up only when the reader is gone.
fn write_with_retry<W: Write>(w: &mut W, mut data: &[u8]) {
    let mut delay = RETRY_START;
    while !data.is_empty() {
        match w.write(data) {
            Ok(0) => {
                tracing::warn!("stdout accepted no bytes, retrying in {:?}", delay);
                std::thread::sleep(delay);
                delay = (delay * 2).min(RETRY_MAX);
            }
            Ok(n) => {
                data = &data[n.min(data.len())..];
                delay = RETRY_START;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::error!("error writing output to standard out: {}", e);
                return;
            }
            Err(e) => {
                tracing::warn!("error writing output to standard out: {}, retrying in {:?}", e, delay);
                std::thread::sleep(delay);
                delay = (delay * 2).min(RETRY_MAX);
            }
        }
    }
    if let Err(e) = w.flush() {
        tracing::error!("error flushing standard out: {}", e);
    }
}
