//! Descriptor nodes as template values
//!
//! The prost descriptor tree is rebuilt once per request into reference
//! counted nodes that carry their fully qualified names. Child lists are moved
//! out of each prost message into the node, so every descriptor is stored
//! exactly once and handing a node to a template is a pointer copy.

use minijinja::value::{Enumerator, Object, Value};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MethodDescriptorProto, ServiceDescriptorProto, UninterpretedOption,
};
use std::collections::BTreeMap;
use std::fmt;
use std::mem::take;
use std::sync::Arc;

/// A `.proto` file with its top-level declarations
#[derive(Debug)]
pub struct FileNode {
    /// The file descriptor with its declaration lists moved into this node
    pub proto: FileDescriptorProto,
    /// Qualified-name prefix of top-level declarations: `.<package>.`
    pub prefix: String,
    /// Top-level messages
    pub messages: Vec<Arc<MessageNode>>,
    /// Top-level enums
    pub enums: Vec<Arc<EnumNode>>,
    /// Top-level extensions
    pub extensions: Vec<Arc<FieldNode>>,
    /// Services
    pub services: Vec<Arc<ServiceNode>>,
}

/// A message and everything nested in it
#[derive(Debug)]
pub struct MessageNode {
    /// The message descriptor with its child lists moved into this node
    pub proto: DescriptorProto,
    /// Fully qualified dotted name
    pub full_name: String,
    /// Fields in declaration order
    pub fields: Vec<Arc<FieldNode>>,
    /// Nested messages
    pub nested: Vec<Arc<MessageNode>>,
    /// Nested enums
    pub enums: Vec<Arc<EnumNode>>,
    /// Extensions declared inside this message
    pub extensions: Vec<Arc<FieldNode>>,
}

/// A message field or an extension
#[derive(Debug)]
pub struct FieldNode {
    /// The field descriptor
    pub proto: FieldDescriptorProto,
    /// Fully qualified dotted name
    pub full_name: String,
}

/// An enum and its values
#[derive(Debug)]
pub struct EnumNode {
    /// The enum descriptor with its values moved into this node
    pub proto: EnumDescriptorProto,
    /// Fully qualified dotted name
    pub full_name: String,
    /// Values in declaration order
    pub values: Vec<Arc<EnumValueDescriptorProto>>,
}

/// A service and its methods
#[derive(Debug)]
pub struct ServiceNode {
    /// The service descriptor with its methods moved into this node
    pub proto: ServiceDescriptorProto,
    /// Fully qualified dotted name
    pub full_name: String,
    /// Methods in declaration order
    pub methods: Vec<Arc<MethodDescriptorProto>>,
}

/// Qualified-name prefix for declarations of a package
pub fn package_prefix(package: &str) -> String {
    if package.is_empty() {
        ".".to_string()
    } else {
        format!(".{}.", package)
    }
}

impl FileNode {
    /// Rebuild a file descriptor into a node tree
    pub fn build(mut proto: FileDescriptorProto) -> Arc<Self> {
        let prefix = package_prefix(proto.package());

        let messages = take(&mut proto.message_type)
            .into_iter()
            .map(|m| MessageNode::build(m, &prefix))
            .collect();
        let enums = take(&mut proto.enum_type)
            .into_iter()
            .map(|e| EnumNode::build(e, &prefix))
            .collect();
        let extensions = take(&mut proto.extension)
            .into_iter()
            .map(|f| FieldNode::build(f, &prefix))
            .collect();
        let services = take(&mut proto.service)
            .into_iter()
            .map(|s| ServiceNode::build(s, &prefix))
            .collect();

        Arc::new(FileNode {
            proto,
            prefix,
            messages,
            enums,
            extensions,
            services,
        })
    }

    /// File name as given to protoc
    pub fn name(&self) -> &str {
        self.proto.name()
    }

    /// Package name, empty when the file has none
    pub fn package(&self) -> &str {
        self.proto.package()
    }
}

impl MessageNode {
    fn build(mut proto: DescriptorProto, prefix: &str) -> Arc<Self> {
        let full_name = format!("{}{}", prefix, proto.name());
        let child_prefix = format!("{}.", full_name);

        let fields = take(&mut proto.field)
            .into_iter()
            .map(|f| FieldNode::build(f, &child_prefix))
            .collect();
        let nested = take(&mut proto.nested_type)
            .into_iter()
            .map(|m| MessageNode::build(m, &child_prefix))
            .collect();
        let enums = take(&mut proto.enum_type)
            .into_iter()
            .map(|e| EnumNode::build(e, &child_prefix))
            .collect();
        let extensions = take(&mut proto.extension)
            .into_iter()
            .map(|f| FieldNode::build(f, &child_prefix))
            .collect();

        Arc::new(MessageNode {
            proto,
            full_name,
            fields,
            nested,
            enums,
            extensions,
        })
    }
}

impl FieldNode {
    fn build(proto: FieldDescriptorProto, prefix: &str) -> Arc<Self> {
        let full_name = format!("{}{}", prefix, proto.name());
        Arc::new(FieldNode { proto, full_name })
    }

    /// Declared label, if set and known
    pub fn label(&self) -> Option<Label> {
        self.proto.label.and_then(|l| Label::try_from(l).ok())
    }

    /// Declared wire type, if set and known
    pub fn field_type(&self) -> Option<Type> {
        self.proto.r#type.and_then(|t| Type::try_from(t).ok())
    }
}

impl EnumNode {
    fn build(mut proto: EnumDescriptorProto, prefix: &str) -> Arc<Self> {
        let full_name = format!("{}{}", prefix, proto.name());
        let values = take(&mut proto.value).into_iter().map(Arc::new).collect();
        Arc::new(EnumNode {
            proto,
            full_name,
            values,
        })
    }
}

impl ServiceNode {
    fn build(mut proto: ServiceDescriptorProto, prefix: &str) -> Arc<Self> {
        let full_name = format!("{}{}", prefix, proto.name());
        let methods = take(&mut proto.method).into_iter().map(Arc::new).collect();
        Arc::new(ServiceNode {
            proto,
            full_name,
            methods,
        })
    }
}

/// Any descriptor a template can hold
#[derive(Debug, Clone)]
pub enum Node {
    /// A `.proto` file
    File(Arc<FileNode>),
    /// A message
    Message(Arc<MessageNode>),
    /// An enum
    Enum(Arc<EnumNode>),
    /// One value of an enum
    EnumValue(Arc<EnumValueDescriptorProto>),
    /// A field declared in a message
    Field(Arc<FieldNode>),
    /// An extension field
    Extension(Arc<FieldNode>),
    /// A service
    Service(Arc<ServiceNode>),
    /// One method of a service
    Method(Arc<MethodDescriptorProto>),
}

const FILE_KEYS: &[&str] = &[
    "name",
    "package",
    "syntax",
    "dependency",
    "prefix",
    "message_type",
    "enum_type",
    "service",
    "extension",
    "options",
];
const MESSAGE_KEYS: &[&str] = &[
    "name",
    "full_name",
    "field",
    "nested_type",
    "enum_type",
    "extension",
    "oneof_decl",
    "map_entry",
];
const FIELD_KEYS: &[&str] = &[
    "name",
    "full_name",
    "number",
    "label",
    "type",
    "type_name",
    "extendee",
    "default_value",
    "json_name",
    "oneof_index",
    "proto3_optional",
    "is_extension",
];
const ENUM_KEYS: &[&str] = &["name", "full_name", "value"];
const ENUM_VALUE_KEYS: &[&str] = &["name", "number"];
const SERVICE_KEYS: &[&str] = &["name", "full_name", "method"];
const METHOD_KEYS: &[&str] = &[
    "name",
    "input_type",
    "output_type",
    "client_streaming",
    "server_streaming",
];

impl Node {
    /// Wrap into a template value
    pub fn into_value(self) -> Value {
        Value::from_object(self)
    }

    /// The node behind a template value, if it holds one
    pub fn from_value(value: &Value) -> Option<&Node> {
        value.downcast_object_ref::<Node>()
    }

    /// Local (unqualified) name
    pub fn name(&self) -> &str {
        match self {
            Node::File(f) => f.name(),
            Node::Message(m) => m.proto.name(),
            Node::Enum(e) => e.proto.name(),
            Node::EnumValue(v) => v.name(),
            Node::Field(f) | Node::Extension(f) => f.proto.name(),
            Node::Service(s) => s.proto.name(),
            Node::Method(m) => m.name(),
        }
    }

    /// Fully qualified dotted name, or the local name where none is tracked
    pub fn full_name(&self) -> &str {
        match self {
            Node::Message(m) => &m.full_name,
            Node::Enum(e) => &e.full_name,
            Node::Field(f) | Node::Extension(f) => &f.full_name,
            Node::Service(s) => &s.full_name,
            _ => self.name(),
        }
    }

    /// Whether both nodes wrap the same descriptor
    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::File(a), Node::File(b)) => Arc::ptr_eq(a, b),
            (Node::Message(a), Node::Message(b)) => Arc::ptr_eq(a, b),
            (Node::Enum(a), Node::Enum(b)) => Arc::ptr_eq(a, b),
            (Node::EnumValue(a), Node::EnumValue(b)) => Arc::ptr_eq(a, b),
            (Node::Field(a), Node::Field(b)) => Arc::ptr_eq(a, b),
            (Node::Extension(a), Node::Extension(b)) => Arc::ptr_eq(a, b),
            (Node::Service(a), Node::Service(b)) => Arc::ptr_eq(a, b),
            (Node::Method(a), Node::Method(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn keys(&self) -> &'static [&'static str] {
        match self {
            Node::File(_) => FILE_KEYS,
            Node::Message(_) => MESSAGE_KEYS,
            Node::Enum(_) => ENUM_KEYS,
            Node::EnumValue(_) => ENUM_VALUE_KEYS,
            Node::Field(_) | Node::Extension(_) => FIELD_KEYS,
            Node::Service(_) => SERVICE_KEYS,
            Node::Method(_) => METHOD_KEYS,
        }
    }

    fn attr(&self, key: &str) -> Option<Value> {
        match self {
            Node::File(f) => file_attr(f, key),
            Node::Message(m) => message_attr(m, key),
            Node::Enum(e) => match key {
                "name" => Some(Value::from(e.proto.name())),
                "full_name" => Some(Value::from(e.full_name.as_str())),
                "value" => Some(list(&e.values, Node::EnumValue)),
                _ => None,
            },
            Node::EnumValue(v) => match key {
                "name" => Some(Value::from(v.name())),
                "number" => Some(Value::from(v.number())),
                _ => None,
            },
            Node::Field(f) => field_attr(f, key, false),
            Node::Extension(f) => field_attr(f, key, true),
            Node::Service(s) => match key {
                "name" => Some(Value::from(s.proto.name())),
                "full_name" => Some(Value::from(s.full_name.as_str())),
                "method" => Some(list(&s.methods, Node::Method)),
                _ => None,
            },
            Node::Method(m) => match key {
                "name" => Some(Value::from(m.name())),
                "input_type" => Some(Value::from(m.input_type())),
                "output_type" => Some(Value::from(m.output_type())),
                "client_streaming" => Some(Value::from(m.client_streaming())),
                "server_streaming" => Some(Value::from(m.server_streaming())),
                _ => None,
            },
        }
    }
}

impl Object for Node {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.attr(key.as_str()?)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(self.keys())
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

fn list<T>(items: &[Arc<T>], wrap: fn(Arc<T>) -> Node) -> Value {
    Value::from(
        items
            .iter()
            .cloned()
            .map(|item| wrap(item).into_value())
            .collect::<Vec<_>>(),
    )
}

fn opt<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::from(()))
}

fn file_attr(file: &FileNode, key: &str) -> Option<Value> {
    let value = match key {
        "name" => Value::from(file.name()),
        "package" => Value::from(file.package()),
        "syntax" => Value::from(file.proto.syntax()),
        "dependency" => Value::from(file.proto.dependency.clone()),
        "prefix" => Value::from(file.prefix.as_str()),
        "message_type" => list(&file.messages, Node::Message),
        "enum_type" => list(&file.enums, Node::Enum),
        "service" => list(&file.services, Node::Service),
        "extension" => list(&file.extensions, Node::Extension),
        "options" => {
            let options = file
                .proto
                .options
                .as_ref()
                .map(|o| o.uninterpreted_option.as_slice())
                .unwrap_or(&[]);
            Value::from(
                options
                    .iter()
                    .map(|opt| {
                        let mut entry = BTreeMap::new();
                        entry.insert("name", Value::from(option_name(opt)));
                        entry.insert("value", opt_value(option_value(opt)));
                        Value::from_serialize(&entry)
                    })
                    .collect::<Vec<_>>(),
            )
        }
        _ => return None,
    };
    Some(value)
}

fn opt_value(value: Option<Value>) -> Value {
    value.unwrap_or(Value::from(()))
}

fn message_attr(message: &MessageNode, key: &str) -> Option<Value> {
    let value = match key {
        "name" => Value::from(message.proto.name()),
        "full_name" => Value::from(message.full_name.as_str()),
        "field" => list(&message.fields, Node::Field),
        "nested_type" => list(&message.nested, Node::Message),
        "enum_type" => list(&message.enums, Node::Enum),
        "extension" => list(&message.extensions, Node::Extension),
        "oneof_decl" => Value::from(
            message
                .proto
                .oneof_decl
                .iter()
                .map(|o| o.name().to_string())
                .collect::<Vec<_>>(),
        ),
        "map_entry" => Value::from(
            message
                .proto
                .options
                .as_ref()
                .map(|o| o.map_entry())
                .unwrap_or(false),
        ),
        _ => return None,
    };
    Some(value)
}

fn field_attr(field: &FieldNode, key: &str, is_extension: bool) -> Option<Value> {
    let proto = &field.proto;
    let value = match key {
        "name" => Value::from(proto.name()),
        "full_name" => Value::from(field.full_name.as_str()),
        "number" => Value::from(proto.number()),
        "label" => opt(field.label().map(|l| l.as_str_name())),
        "type" => opt(field.field_type().map(|t| t.as_str_name())),
        "type_name" => opt(proto.type_name.clone()),
        "extendee" => opt(proto.extendee.clone()),
        "default_value" => opt(proto.default_value.clone()),
        "json_name" => opt(proto.json_name.clone()),
        "oneof_index" => opt(proto.oneof_index),
        "proto3_optional" => Value::from(proto.proto3_optional()),
        "is_extension" => Value::from(is_extension),
        _ => return None,
    };
    Some(value)
}

/// Dotted name of an uninterpreted option, extension parts in parentheses
pub fn option_name(opt: &UninterpretedOption) -> String {
    opt.name
        .iter()
        .map(|part| {
            if part.is_extension {
                format!("({})", part.name_part)
            } else {
                part.name_part.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Typed value of an uninterpreted option
///
/// The first populated value slot wins, in the order identifier, positive
/// integer, negative integer, double, aggregate, string.
pub fn option_value(opt: &UninterpretedOption) -> Option<Value> {
    if let Some(v) = &opt.identifier_value {
        Some(Value::from(v.as_str()))
    } else if let Some(v) = opt.positive_int_value {
        Some(Value::from(v))
    } else if let Some(v) = opt.negative_int_value {
        Some(Value::from(v))
    } else if let Some(v) = opt.double_value {
        Some(Value::from(v))
    } else if let Some(v) = &opt.aggregate_value {
        Some(Value::from(v.as_str()))
    } else {
        opt.string_value
            .as_ref()
            .map(|v| Value::from(String::from_utf8_lossy(v).into_owned()))
    }
}
