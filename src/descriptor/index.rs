//! Flat, name-keyed views over the descriptor tree
//!
//! Templates mostly want "every message" or "the enum called `.pkg.Kind`"
//! rather than walking the nesting by hand, so each request is flattened into
//! maps keyed by fully qualified dotted name.

use super::node::{EnumNode, FieldNode, FileNode, MessageNode, Node, ServiceNode};
use super::DescriptorSet;
use minijinja::value::{Enumerator, Object, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name-keyed index of every declaration in a set of files
///
/// Keys are fully qualified (`.pkg.Outer.Inner`). When two declarations share
/// a name the first one registered keeps the slot.
#[derive(Debug, Default)]
pub struct FlatIndex {
    /// Files by file name
    pub files: BTreeMap<String, Arc<FileNode>>,
    /// Messages, nested ones included
    pub messages: BTreeMap<String, Arc<MessageNode>>,
    /// Enums, nested ones included
    pub enums: BTreeMap<String, Arc<EnumNode>>,
    /// Extensions, nested ones included
    pub extensions: BTreeMap<String, Arc<FieldNode>>,
    /// Services
    pub services: BTreeMap<String, Arc<ServiceNode>>,
}

impl FlatIndex {
    /// Index every file of the request
    pub fn visible(set: &DescriptorSet) -> Self {
        let mut index = FlatIndex::default();
        for file in &set.files {
            index.add_file(file);
        }
        index
    }

    /// Index only the files protoc asked to generate
    pub fn exported(set: &DescriptorSet) -> Self {
        let mut index = FlatIndex::default();
        for file in set.files.iter().filter(|f| set.is_generated(f.name())) {
            index.add_file(file);
        }
        index
    }

    /// Index a single file
    pub fn for_file(file: &Arc<FileNode>) -> Self {
        let mut index = FlatIndex::default();
        index.add_file(file);
        index
    }

    /// Add a file and everything declared in it
    pub fn add_file(&mut self, file: &Arc<FileNode>) {
        self.files
            .entry(file.name().to_string())
            .or_insert_with(|| file.clone());

        self.add_messages(&file.messages);
        add_all(&mut self.enums, &file.enums, |e| &e.full_name);
        add_all(&mut self.extensions, &file.extensions, |f| &f.full_name);
        add_all(&mut self.services, &file.services, |s| &s.full_name);
    }

    fn add_messages(&mut self, messages: &[Arc<MessageNode>]) {
        for message in messages {
            self.messages
                .entry(message.full_name.clone())
                .or_insert_with(|| message.clone());

            self.add_messages(&message.nested);
            add_all(&mut self.enums, &message.enums, |e| &e.full_name);
            add_all(&mut self.extensions, &message.extensions, |f| &f.full_name);
        }
    }

    /// Total number of indexed declarations, files excluded
    pub fn len(&self) -> usize {
        self.messages.len() + self.enums.len() + self.extensions.len() + self.services.len()
    }

    /// Whether nothing but files were indexed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look a qualified name up in every declaration map
    pub fn get(&self, name: &str) -> Option<Node> {
        if let Some(m) = self.messages.get(name) {
            return Some(Node::Message(m.clone()));
        }
        if let Some(e) = self.enums.get(name) {
            return Some(Node::Enum(e.clone()));
        }
        if let Some(f) = self.extensions.get(name) {
            return Some(Node::Extension(f.clone()));
        }
        self.services.get(name).map(|s| Node::Service(s.clone()))
    }

    /// Wrap into a template value
    pub fn into_value(self: Arc<Self>) -> Value {
        Value::from_dyn_object(self)
    }
}

fn add_all<T>(map: &mut BTreeMap<String, Arc<T>>, items: &[Arc<T>], key: fn(&T) -> &String) {
    for item in items {
        map.entry(key(item).clone()).or_insert_with(|| item.clone());
    }
}

impl Object for FlatIndex {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let kind = match key.as_str()? {
            "files" => MapKind::Files,
            "messages" => MapKind::Messages,
            "enums" => MapKind::Enums,
            "extensions" => MapKind::Extensions,
            "services" => MapKind::Services,
            "package" => {
                return Some(match self.files.len() {
                    0 => Value::from(()),
                    1 => {
                        let file = self.files.values().next()?;
                        Node::File(file.clone()).into_value()
                    }
                    _ => Value::from_object(MapView {
                        index: self.clone(),
                        kind: MapKind::Files,
                    }),
                });
            }
            _ => return None,
        };
        Some(Value::from_object(MapView {
            index: self.clone(),
            kind,
        }))
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&[
            "files",
            "messages",
            "enums",
            "extensions",
            "services",
            "package",
        ])
    }
}

#[derive(Debug, Clone, Copy)]
enum MapKind {
    Files,
    Messages,
    Enums,
    Extensions,
    Services,
}

/// One map of a [`FlatIndex`] seen from a template, without copying it
#[derive(Debug)]
struct MapView {
    index: Arc<FlatIndex>,
    kind: MapKind,
}

impl MapView {
    fn keys(&self) -> Vec<Value> {
        fn collect<T>(map: &BTreeMap<String, T>) -> Vec<Value> {
            map.keys().map(|k| Value::from(k.as_str())).collect()
        }
        match self.kind {
            MapKind::Files => collect(&self.index.files),
            MapKind::Messages => collect(&self.index.messages),
            MapKind::Enums => collect(&self.index.enums),
            MapKind::Extensions => collect(&self.index.extensions),
            MapKind::Services => collect(&self.index.services),
        }
    }
}

impl Object for MapView {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        let index = &self.index;
        let node = match self.kind {
            MapKind::Files => Node::File(index.files.get(key)?.clone()),
            MapKind::Messages => Node::Message(index.messages.get(key)?.clone()),
            MapKind::Enums => Node::Enum(index.enums.get(key)?.clone()),
            MapKind::Extensions => Node::Extension(index.extensions.get(key)?.clone()),
            MapKind::Services => Node::Service(index.services.get(key)?.clone()),
        };
        Some(node.into_value())
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.keys())
    }
}
