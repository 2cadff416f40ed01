//! Field classification predicates
//!
//! Each predicate takes a field (or extension) node, a raw protobuf enum number
//! or a proto enum name such as `LABEL_REPEATED` / `TYPE_STRING`, and answers
//! whether it carries the label or wire type in question. Anything else is
//! simply `false`.

use crate::descriptor::Node;
use minijinja::value::{Value, ValueKind};
use minijinja::Environment;
use prost_types::field_descriptor_proto::{Label, Type};

/// A predicate as registered in the template environment
pub type Predicate = fn(&Value) -> bool;

/// Every predicate by its template name
pub const PREDICATES: &[(&str, Predicate)] = &[
    ("is_repeated", is_repeated),
    ("is_optional", is_optional),
    ("is_required", is_required),
    ("is_double", is_double),
    ("is_float", is_float),
    ("is_int64", is_int64),
    ("is_uint64", is_uint64),
    ("is_int32", is_int32),
    ("is_fixed64", is_fixed64),
    ("is_fixed32", is_fixed32),
    ("is_bool", is_bool),
    ("is_string", is_string),
    ("is_group", is_group),
    ("is_message", is_message),
    ("is_bytes", is_bytes),
    ("is_uint32", is_uint32),
    ("is_enum", is_enum),
    ("is_sfixed32", is_sfixed32),
    ("is_sfixed64", is_sfixed64),
    ("is_sint32", is_sint32),
    ("is_sint64", is_sint64),
];

/// Register every predicate as a template function
pub fn register(env: &mut Environment<'static>) {
    for &(name, predicate) in PREDICATES {
        env.add_function(name, move |value: Value| predicate(&value));
    }
}

/// Raw enum number carried by a plain value
///
/// Fields without a declared type are not classified at all.
fn raw_number(
    value: &Value,
    field: fn(&Node) -> Option<i32>,
    parse: fn(&str) -> Option<i32>,
) -> Option<i32> {
    if let Some(node) = Node::from_value(value) {
        return field(node);
    }

    match value.kind() {
        ValueKind::Number => value.as_i64().and_then(|n| i32::try_from(n).ok()),
        ValueKind::String => parse(value.as_str()?),
        _ => None,
    }
}

fn node_label(node: &Node) -> Option<i32> {
    match node {
        Node::Field(f) | Node::Extension(f) if f.proto.r#type.is_some() => f.proto.label,
        _ => None,
    }
}

fn node_type(node: &Node) -> Option<i32> {
    match node {
        Node::Field(f) | Node::Extension(f) => f.proto.r#type,
        _ => None,
    }
}

fn parse_label(name: &str) -> Option<i32> {
    let upper = name.to_ascii_uppercase();
    Label::from_str_name(&upper)
        .or_else(|| Label::from_str_name(&format!("LABEL_{}", upper)))
        .map(Into::into)
}

fn parse_type(name: &str) -> Option<i32> {
    let upper = name.to_ascii_uppercase();
    Type::from_str_name(&upper)
        .or_else(|| Type::from_str_name(&format!("TYPE_{}", upper)))
        .map(Into::into)
}

fn label_is(value: &Value, want: Label) -> bool {
    raw_number(value, node_label, parse_label) == Some(i32::from(want))
}

fn type_is(value: &Value, want: Type) -> bool {
    raw_number(value, node_type, parse_type) == Some(i32::from(want))
}

/// Label is `repeated`
pub fn is_repeated(value: &Value) -> bool {
    label_is(value, Label::Repeated)
}

/// Label is `optional`
pub fn is_optional(value: &Value) -> bool {
    label_is(value, Label::Optional)
}

/// Label is `required`
pub fn is_required(value: &Value) -> bool {
    label_is(value, Label::Required)
}

/// Wire type `double`
pub fn is_double(value: &Value) -> bool {
    type_is(value, Type::Double)
}

/// Wire type `float`
pub fn is_float(value: &Value) -> bool {
    type_is(value, Type::Float)
}

/// Wire type `int64`
pub fn is_int64(value: &Value) -> bool {
    type_is(value, Type::Int64)
}

/// Wire type `uint64`
pub fn is_uint64(value: &Value) -> bool {
    type_is(value, Type::Uint64)
}

/// Wire type `int32`
pub fn is_int32(value: &Value) -> bool {
    type_is(value, Type::Int32)
}

/// Wire type `fixed64`
pub fn is_fixed64(value: &Value) -> bool {
    type_is(value, Type::Fixed64)
}

/// Wire type `fixed32`
pub fn is_fixed32(value: &Value) -> bool {
    type_is(value, Type::Fixed32)
}

/// Wire type `bool`
pub fn is_bool(value: &Value) -> bool {
    type_is(value, Type::Bool)
}

/// Wire type `string`
pub fn is_string(value: &Value) -> bool {
    type_is(value, Type::String)
}

/// Wire type `group`
pub fn is_group(value: &Value) -> bool {
    type_is(value, Type::Group)
}

/// Wire type `message`, or a message node itself
pub fn is_message(value: &Value) -> bool {
    matches!(Node::from_value(value), Some(Node::Message(_))) || type_is(value, Type::Message)
}

/// Wire type `bytes`
pub fn is_bytes(value: &Value) -> bool {
    type_is(value, Type::Bytes)
}

/// Wire type `uint32`
pub fn is_uint32(value: &Value) -> bool {
    type_is(value, Type::Uint32)
}

/// Wire type `enum`, or an enum node itself
pub fn is_enum(value: &Value) -> bool {
    matches!(Node::from_value(value), Some(Node::Enum(_))) || type_is(value, Type::Enum)
}

/// Wire type `sfixed32`
pub fn is_sfixed32(value: &Value) -> bool {
    type_is(value, Type::Sfixed32)
}

/// Wire type `sfixed64`
pub fn is_sfixed64(value: &Value) -> bool {
    type_is(value, Type::Sfixed64)
}

/// Wire type `sint32`
pub fn is_sint32(value: &Value) -> bool {
    type_is(value, Type::Sint32)
}

/// Wire type `sint64`
pub fn is_sint64(value: &Value) -> bool {
    type_is(value, Type::Sint64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FileNode;
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    };

    fn file() -> std::sync::Arc<FileNode> {
        FileNode::build(FileDescriptorProto {
            name: Some("t.proto".to_string()),
            package: Some("t".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Foo".to_string()),
                field: vec![
                    FieldDescriptorProto {
                        name: Some("bar".to_string()),
                        label: Some(Label::Repeated.into()),
                        r#type: Some(Type::String.into()),
                        ..Default::default()
                    },
                    FieldDescriptorProto {
                        name: Some("untyped".to_string()),
                        label: Some(Label::Repeated.into()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            enum_type: vec![EnumDescriptorProto {
                name: Some("Kind".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    #[test]
    fn test_field_predicates() {
        let file = file();
        let bar = Node::Field(file.messages[0].fields[0].clone()).into_value();
        assert!(is_repeated(&bar));
        assert!(is_string(&bar));
        assert!(!is_optional(&bar));
        assert!(!is_bytes(&bar));
        assert!(!is_message(&bar));
    }

    #[test]
    fn test_untyped_field_is_unclassified() {
        let file = file();
        let untyped = Node::Field(file.messages[0].fields[1].clone()).into_value();
        assert!(!is_repeated(&untyped));
        assert!(!is_double(&untyped));
    }

    #[test]
    fn test_raw_values() {
        assert!(is_repeated(&Value::from(3)));
        assert!(is_int64(&Value::from(3)));
        assert!(is_string(&Value::from("TYPE_STRING")));
        assert!(is_string(&Value::from("string")));
        assert!(is_repeated(&Value::from("LABEL_REPEATED")));
        assert!(!is_repeated(&Value::from("TYPE_STRING")));
        assert!(!is_string(&Value::from(true)));
        assert!(!is_string(&Value::from(())));
    }

    #[test]
    fn test_node_kinds() {
        let file = file();
        let message = Node::Message(file.messages[0].clone()).into_value();
        let kind = Node::Enum(file.enums[0].clone()).into_value();
        assert!(is_message(&message));
        assert!(!is_enum(&message));
        assert!(is_enum(&kind));
        assert!(!is_message(&kind));
        assert!(!is_repeated(&message));
        assert!(!is_string(&Node::File(file).into_value()));
    }
}
