//! The value templates render against

use crate::descriptor::{DescriptorSet, FlatIndex};
use crate::params::Params;
use minijinja::value::{Enumerator, Object, Value};
use std::sync::Arc;

/// What the caller of `exec`/`fexec` handed to the invoked template
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// No arguments
    #[default]
    None,
    /// Exactly one argument, passed through as is
    Single(Value),
    /// Several arguments, in call order
    List(Vec<Value>),
}

impl Payload {
    /// Pack call arguments
    ///
    /// A lone argument that is itself a root context carries no payload: the
    /// invoked template simply sees the root again.
    pub fn from_args(mut args: Vec<Value>) -> Self {
        match args.len() {
            0 => Payload::None,
            1 if args[0].downcast_object_ref::<Root>().is_some() => Payload::None,
            1 => Payload::Single(args.remove(0)),
            _ => Payload::List(args),
        }
    }

    /// Template view of the payload
    pub fn to_value(&self) -> Value {
        match self {
            Payload::None => Value::from(()),
            Payload::Single(value) => value.clone(),
            Payload::List(values) => Value::from(values.clone()),
        }
    }
}

/// Root execution context
///
/// Every entry template starts from the same root; `exec` and `fexec` hand
/// the invoked template a copy with its payload and `has_data` replaced.
#[derive(Debug, Clone)]
pub struct Root {
    /// The request's descriptors
    pub request: Arc<DescriptorSet>,
    /// Index of every file in the request
    pub visible: Arc<FlatIndex>,
    /// Index of only the files to generate
    pub exported: Arc<FlatIndex>,
    /// Parsed plugin parameters
    pub params: Arc<Params>,
    /// Whether the output file being written already held data
    pub has_data: bool,
    /// Arguments of the invoking call
    pub payload: Payload,
}

impl Root {
    /// Build the root context of a run
    pub fn new(request: Arc<DescriptorSet>, params: Arc<Params>) -> Self {
        Root {
            visible: Arc::new(FlatIndex::visible(&request)),
            exported: Arc::new(FlatIndex::exported(&request)),
            request,
            params,
            has_data: false,
            payload: Payload::None,
        }
    }

    /// Copy of this root for a nested invocation
    pub fn with_payload(&self, payload: Payload, has_data: bool) -> Self {
        Root {
            has_data,
            payload,
            ..self.clone()
        }
    }

    /// Wrap into a template value
    pub fn into_value(self) -> Value {
        Value::from_object(self)
    }
}

impl Object for Root {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let value = match key.as_str()? {
            "request" => Value::from_dyn_object(self.request.clone()),
            "visible" => self.visible.clone().into_value(),
            "exported" => self.exported.clone().into_value(),
            "params" => self.params.to_value(),
            "has_data" => Value::from(self.has_data),
            "payload" => self.payload.to_value(),
            _ => return None,
        };
        Some(value)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&[
            "request", "visible", "exported", "params", "has_data", "payload",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Root {
        Root::new(
            Arc::new(DescriptorSet::default()),
            Arc::new(Params::parse("a=1").unwrap()),
        )
    }

    #[test]
    fn test_payload_packing() {
        assert!(matches!(Payload::from_args(vec![]), Payload::None));
        match Payload::from_args(vec![Value::from(1)]) {
            Payload::Single(v) => assert_eq!(v.as_i64(), Some(1)),
            other => panic!("unexpected {:?}", other),
        }
        match Payload::from_args(vec![Value::from(1), Value::from("x")]) {
            Payload::List(v) => assert_eq!(v.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            Payload::from_args(vec![root().into_value()]),
            Payload::None
        ));
    }

    #[test]
    fn test_root_attributes() {
        let value = root()
            .with_payload(Payload::Single(Value::from("p")), true)
            .into_value();
        assert_eq!(value.get_attr("payload").unwrap().as_str(), Some("p"));
        assert!(value.get_attr("has_data").unwrap().is_true());
        let a = value.get_attr("params").unwrap().get_attr("a").unwrap();
        assert_eq!(a.get_item(&Value::from(0)).unwrap().as_str(), Some("1"));
        assert!(value.get_attr("nothing").unwrap().is_undefined());
    }
}
