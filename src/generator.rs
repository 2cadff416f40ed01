//! One plugin run: request in, rendered files out

use crate::descriptor::DescriptorSet;
use crate::params::Params;
use crate::template::{template_name, Engine};
use crate::GeneratorError;
use prost::Message;
use prost_types::compiler::code_generator_response::{Feature, File};
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use std::sync::Arc;

/// Decode a request and run it
pub fn generate_from_bytes(bytes: &[u8]) -> Result<CodeGeneratorResponse, GeneratorError> {
    if bytes.is_empty() {
        return Err(GeneratorError::NoInput);
    }
    let request = CodeGeneratorRequest::decode(bytes)
        .map_err(|e| GeneratorError::DecodeError(e.to_string()))?;
    generate(request)
}

/// Render every entry template against the request
pub fn generate(request: CodeGeneratorRequest) -> Result<CodeGeneratorResponse, GeneratorError> {
    let params = Params::parse(request.parameter())?;
    let sources: Vec<String> = params.values("template").to_vec();
    let entries: Vec<String> = match params.values("exec") {
        [] => sources.iter().map(String::as_str).map(template_name).collect(),
        names => names.to_vec(),
    };

    if sources.is_empty() {
        return Err(GeneratorError::TemplateLoadError(
            "no template files named in the `template` parameter".to_string(),
        ));
    }

    let set = Arc::new(DescriptorSet::from_request(request));
    tracing::debug!(
        files = set.files.len(),
        generate = set.file_to_generate.len(),
        "decoded request"
    );

    let mut engine = Engine::new(set, params)?;
    for source in &sources {
        engine.load_file(source)?;
    }
    for entry in &entries {
        engine.execute(entry)?;
    }

    let file = engine
        .take_files()
        .into_iter()
        .map(|(name, content)| {
            tracing::info!("OUT={:?}", name);
            File {
                name: Some(name),
                content: Some(content),
                ..Default::default()
            }
        })
        .collect();

    Ok(CodeGeneratorResponse {
        file,
        supported_features: Some(Feature::Proto3Optional as u64),
        ..Default::default()
    })
}
