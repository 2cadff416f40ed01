//! Named output buffers
//!
//! Each `fexec` target is a virtual file that only ever grows. Buffers are
//! created on first use and handed back in creation order once the run ends.

use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, PoisonError};

/// Accumulated content of every virtual output file
#[derive(Debug, Default)]
pub struct OutputFiles {
    order: Vec<String>,
    buffers: HashMap<String, Vec<u8>>,
}

impl OutputFiles {
    /// Make sure a buffer exists for `name`; returns whether it already held data
    pub fn open(&mut self, name: &str) -> bool {
        match self.buffers.get(name) {
            Some(buf) => !buf.is_empty(),
            None => {
                self.order.push(name.to_string());
                self.buffers.insert(name.to_string(), Vec::new());
                false
            }
        }
    }

    /// Whether `name` exists and is non-empty
    pub fn has_data(&self, name: &str) -> bool {
        self.buffers.get(name).is_some_and(|b| !b.is_empty())
    }

    /// Append to `name`, creating it if needed
    pub fn append(&mut self, name: &str, data: &[u8]) {
        self.open(name);
        if let Some(buf) = self.buffers.get_mut(name) {
            buf.extend_from_slice(data);
        }
    }

    /// Current content of `name`
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.buffers.get(name).map(Vec::as_slice)
    }

    /// Number of buffers created so far
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no buffer was created
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drain every buffer as `(name, content)` in creation order
    pub fn take_files(&mut self) -> Vec<(String, String)> {
        let mut buffers = std::mem::take(&mut self.buffers);
        std::mem::take(&mut self.order)
            .into_iter()
            .map(|name| {
                let content = buffers.remove(&name).unwrap_or_default();
                (name, String::from_utf8_lossy(&content).into_owned())
            })
            .collect()
    }
}

/// Streams rendered text straight into one shared buffer
///
/// The lock is only held for the duration of a single write, so templates
/// invoked while rendering can append to the same buffer in between.
pub(crate) struct BufferWriter<'a> {
    pub(crate) outputs: &'a Mutex<OutputFiles>,
    pub(crate) name: &'a str,
}

impl io::Write for BufferWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(self.name, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
