//! Integration tests for protoc-gen-stencil
//!
//! These tests run the full pipeline: a hand-built request, template files
//! from `tests/fixtures`, and the response protoc would receive.

use prost::Message;
use prost_types::compiler::code_generator_response::Feature;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use protoc_gen_stencil::GeneratorError;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// Parameter string loading the named fixtures
fn templates(names: &[&str]) -> String {
    let paths: Vec<String> = names.iter().map(|n| fixture(n)).collect();
    format!("template={}", paths.join(","))
}

/// One file, package `t`, with message `Foo { repeated string bar = 1; }`
fn create_test_request(parameter: String) -> CodeGeneratorRequest {
    let foo = DescriptorProto {
        name: Some("Foo".to_string()),
        field: vec![FieldDescriptorProto {
            name: Some("bar".to_string()),
            number: Some(1),
            label: Some(Label::Repeated.into()),
            r#type: Some(Type::String.into()),
            json_name: Some("bar".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };

    let file = FileDescriptorProto {
        name: Some("t.proto".to_string()),
        package: Some("t".to_string()),
        message_type: vec![foo],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    };

    CodeGeneratorRequest {
        file_to_generate: vec!["t.proto".to_string()],
        parameter: Some(parameter),
        proto_file: vec![file],
        ..Default::default()
    }
}

fn files(response: &CodeGeneratorResponse) -> Vec<(&str, &str)> {
    response
        .file
        .iter()
        .map(|f| (f.name(), f.content()))
        .collect()
}

#[test]
fn test_repeated_string_field() {
    let parameter = format!("{};exec=fields.tmpl", templates(&["fields.tmpl", "field.tmpl"]));
    let response = protoc_gen_stencil::generate(create_test_request(parameter)).unwrap();

    assert!(response.error.is_none());
    assert_eq!(files(&response), vec![("foo.txt", "true true\n")]);
    assert_eq!(
        response.supported_features,
        Some(Feature::Proto3Optional as u64)
    );
}

#[test]
fn test_fexec_appends_in_call_order() {
    let parameter = format!("{};exec=twice.tmpl", templates(&["twice.tmpl", "part.tmpl"]));
    let response = protoc_gen_stencil::generate(create_test_request(parameter)).unwrap();

    assert_eq!(
        files(&response),
        vec![(
            "out.txt",
            "first has_data=false\nsecond has_data=true\n"
        )]
    );
}

#[test]
fn test_every_template_is_an_entry_by_default() {
    // part.tmpl also runs as an entry; its own output is discarded
    let parameter = templates(&["twice.tmpl", "part.tmpl"]);
    let response = protoc_gen_stencil::generate(create_test_request(parameter)).unwrap();
    assert_eq!(response.file.len(), 1);
    assert_eq!(response.file[0].name(), "out.txt");
}

#[test]
fn test_find_and_exported_index() {
    let parameter = format!("{};exec=lookup.tmpl", templates(&["lookup.tmpl", "names.tmpl"]));
    let response = protoc_gen_stencil::generate(create_test_request(parameter)).unwrap();
    assert_eq!(
        files(&response),
        vec![("names.txt", ".t.Foo|true|bar|t.proto\n")]
    );
}

#[test]
fn test_custom_delimiters_and_params() {
    let parameter = format!(
        "{};exec=custom.tmpl;left=<<;right=>>;greeting=hello_world",
        templates(&["custom.tmpl", "custom_part.tmpl"])
    );
    let response = protoc_gen_stencil::generate(create_test_request(parameter)).unwrap();
    assert_eq!(
        files(&response),
        vec![("custom.txt", "HelloWorld (* untouched *)\n")]
    );
}

#[test]
fn test_error_helper_aborts_run() {
    let parameter = format!("{};exec=twice.tmpl,error.tmpl", templates(&["twice.tmpl", "part.tmpl", "error.tmpl"]));
    let err = protoc_gen_stencil::generate(create_test_request(parameter)).unwrap_err();
    assert!(matches!(err, GeneratorError::RenderError(_)));
    assert!(err.to_string().contains("bad things happened"), "{}", err);
}

#[test]
fn test_template_parse_error() {
    let err = protoc_gen_stencil::generate(create_test_request(templates(&["broken.tmpl"])))
        .unwrap_err();
    assert!(matches!(err, GeneratorError::TemplateLoadError(_)));
    assert!(err.to_string().starts_with("error parsing template(s): "));
}

#[test]
fn test_missing_template_file() {
    let err = protoc_gen_stencil::generate(create_test_request(templates(&["nope.tmpl"])))
        .unwrap_err();
    assert!(matches!(err, GeneratorError::TemplateLoadError(_)));
}

#[test]
fn test_unknown_entry_template() {
    let parameter = format!("{};exec=absent.tmpl", templates(&["part.tmpl"]));
    let err = protoc_gen_stencil::generate(create_test_request(parameter)).unwrap_err();
    assert!(matches!(err, GeneratorError::RenderError(_)));
}

#[test]
fn test_malformed_parameter() {
    let err = protoc_gen_stencil::generate(create_test_request("a=\"\\q\"".to_string()))
        .unwrap_err();
    assert!(matches!(err, GeneratorError::ParamsError(_)));
}

#[test]
fn test_generate_from_bytes() {
    let parameter = format!("{};exec=fields.tmpl", templates(&["fields.tmpl", "field.tmpl"]));
    let bytes = create_test_request(parameter).encode_to_vec();
    let response = protoc_gen_stencil::generate_from_bytes(&bytes).unwrap();
    assert_eq!(files(&response), vec![("foo.txt", "true true\n")]);
}

#[test]
fn test_no_input() {
    let err = protoc_gen_stencil::generate_from_bytes(&[]).unwrap_err();
    assert_eq!(err.to_string(), "no input provided");
}
