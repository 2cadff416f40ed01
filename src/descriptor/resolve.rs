//! Resolution of fully qualified names
//!
//! Unlike [`FlatIndex`](super::FlatIndex), resolution walks the tree of the
//! request on demand. Services and plain message fields are never resolved;
//! a miss is `None`, not an error.

use super::node::{FileNode, MessageNode, Node};
use super::DescriptorSet;
use std::sync::Arc;

impl DescriptorSet {
    /// Resolve a dotted name such as `.pkg.Outer.Inner`
    ///
    /// Files are tried in request order, skipping those whose package does not
    /// prefix the name. A name equal to `.<package>` yields that file.
    pub fn find(&self, name: &str) -> Option<Node> {
        if !name.starts_with('.') {
            return None;
        }

        for file in &self.files {
            if !file.package().is_empty() {
                if name.len() == file.prefix.len() - 1 && file.prefix.starts_with(name) {
                    return Some(Node::File(file.clone()));
                }
                if !name.starts_with(&file.prefix) {
                    continue;
                }
            }

            if let Some(node) = find_in_file(file, name) {
                return Some(node);
            }
        }

        None
    }
}

fn find_in_file(file: &FileNode, name: &str) -> Option<Node> {
    for message in &file.messages {
        if let Some(node) = find_in_message(message, name) {
            return Some(node);
        }
    }

    if let Some(e) = file.enums.iter().find(|e| e.full_name == name) {
        return Some(Node::Enum(e.clone()));
    }

    file.extensions
        .iter()
        .find(|f| f.full_name == name)
        .map(|f| Node::Extension(f.clone()))
}

fn find_in_message(message: &Arc<MessageNode>, name: &str) -> Option<Node> {
    if message.full_name == name {
        return Some(Node::Message(message.clone()));
    }

    // Only descend when the name continues below this message.
    let rest = name.strip_prefix(message.full_name.as_str())?;
    if !rest.starts_with('.') {
        return None;
    }

    for nested in &message.nested {
        if let Some(node) = find_in_message(nested, name) {
            return Some(node);
        }
    }

    if let Some(e) = message.enums.iter().find(|e| e.full_name == name) {
        return Some(Node::Enum(e.clone()));
    }

    message
        .extensions
        .iter()
        .find(|f| f.full_name == name)
        .map(|f| Node::Extension(f.clone()))
}
