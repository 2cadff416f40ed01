//! Descriptor model shared by the index, the resolver and the templates
//!
//! A [`DescriptorSet`] is the request seen through rebuilt [`Node`] trees:
//! every `.proto` file protoc sent, in request order, plus the list of files
//! it asked to generate.

pub mod index;
pub mod node;
pub mod resolve;

pub use index::FlatIndex;
pub use node::{EnumNode, FieldNode, FileNode, MessageNode, Node, ServiceNode};

use minijinja::value::{Enumerator, Object, Value};
use prost_types::compiler::CodeGeneratorRequest;
use std::sync::Arc;

/// All files of one plugin request
#[derive(Debug, Default)]
pub struct DescriptorSet {
    /// Every file in the request, dependencies first as protoc orders them
    pub files: Vec<Arc<FileNode>>,
    /// Names of the files protoc asked to generate
    pub file_to_generate: Vec<String>,
    /// Raw parameter string
    pub parameter: String,
    /// protoc version, `major.minor.patch[-suffix]`
    pub compiler_version: Option<String>,
}

impl DescriptorSet {
    /// Take ownership of a request and rebuild its descriptors
    pub fn from_request(request: CodeGeneratorRequest) -> Self {
        let compiler_version = request.compiler_version.as_ref().map(|v| {
            let mut version = format!("{}.{}.{}", v.major(), v.minor(), v.patch());
            if !v.suffix().is_empty() {
                version.push('-');
                version.push_str(v.suffix());
            }
            version
        });

        DescriptorSet {
            parameter: request.parameter().to_string(),
            files: request.proto_file.into_iter().map(FileNode::build).collect(),
            file_to_generate: request.file_to_generate,
            compiler_version,
        }
    }

    /// Whether protoc asked to generate the named file
    pub fn is_generated(&self, file_name: &str) -> bool {
        self.file_to_generate.iter().any(|n| n == file_name)
    }

    /// Find a file by name
    pub fn file(&self, file_name: &str) -> Option<&Arc<FileNode>> {
        self.files.iter().find(|f| f.name() == file_name)
    }
}

impl Object for DescriptorSet {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let value = match key.as_str()? {
            "file_to_generate" => Value::from(self.file_to_generate.clone()),
            "parameter" => Value::from(self.parameter.as_str()),
            "proto_file" => Value::from(
                self.files
                    .iter()
                    .map(|f| Node::File(f.clone()).into_value())
                    .collect::<Vec<_>>(),
            ),
            "compiler_version" => match &self.compiler_version {
                Some(v) => Value::from(v.as_str()),
                None => Value::from(()),
            },
            _ => return None,
        };
        Some(value)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&[
            "file_to_generate",
            "parameter",
            "proto_file",
            "compiler_version",
        ])
    }
}
