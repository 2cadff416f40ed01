//! Template execution and output accumulation
//!
//! The [`Engine`] owns the compiled templates and the run's output buffers.
//! Templates never write files directly: the text an entry template renders
//! is discarded, and output only lands in a file through `fexec`.
//!
//! `exec` and `fexec` reach the template registry through the rendering
//! state, so a template can invoke any template of the run, itself included,
//! regardless of load order.

pub mod context;
pub mod funcs;
pub mod output;
pub mod predicates;

pub use context::{Payload, Root};
pub use output::OutputFiles;

use crate::descriptor::DescriptorSet;
use crate::params::Params;
use crate::GeneratorError;
use minijinja::syntax::SyntaxConfig;
use minijinja::value::{Rest, Value};
use minijinja::{AutoEscape, Environment, Error, ErrorKind, State};
use once_cell::sync::OnceCell;
use output::BufferWriter;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default expression delimiters
pub const DEFAULT_LEFT: &str = "(*";
/// Default expression delimiters
pub const DEFAULT_RIGHT: &str = "*)";
const DEFAULT_BLOCK_LEFT: &str = "(%";
const DEFAULT_BLOCK_RIGHT: &str = "%)";
const DEFAULT_COMMENT_LEFT: &str = "(#";
const DEFAULT_COMMENT_RIGHT: &str = "#)";

/// Deepest chain of nested `exec`/`fexec` calls before the run is aborted
pub const MAX_NESTING: usize = 10_000;
/// Remaining stack below which a nested render moves to a fresh segment
const STACK_RED_ZONE: usize = 256 * 1024;
/// Size of each stack segment allocated for nested renders
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

/// State shared between the engine and the functions it registers
#[derive(Debug)]
struct RunState {
    root: Root,
    outputs: Mutex<OutputFiles>,
    /// Name used when `exec`/`fexec` are given an empty template name
    default_template: OnceCell<String>,
    /// Current number of nested `exec`/`fexec` renders
    depth: AtomicUsize,
}

/// Releases one nesting level on drop
struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RunState {
    fn outputs(&self) -> MutexGuard<'_, OutputFiles> {
        self.outputs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a nested render one level deeper, growing the stack on demand
    fn nested<R>(&self, render: impl FnOnce() -> Result<R, Error>) -> Result<R, Error> {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        let _guard = DepthGuard(&self.depth);
        if depth > MAX_NESTING {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("template recursion deeper than {} calls", MAX_NESTING),
            ));
        }
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, render)
    }

    fn template_name(&self, name: &str) -> Result<String, Error> {
        if !name.is_empty() {
            return Ok(name.to_string());
        }
        self.default_template.get().cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::TemplateNotFound,
                "no template loaded to stand in for the unnamed template",
            )
        })
    }

    /// `exec(name, ...)`: render and return the text
    fn exec(&self, state: &State, name: &str, args: Vec<Value>) -> Result<String, Error> {
        let name = self.template_name(name)?;
        let ctx = self.root.with_payload(Payload::from_args(args), false);
        let tmpl = state.env().get_template(&name)?;
        self.nested(|| tmpl.render(ctx.into_value()))
    }

    /// `fexec(name, outfile, ...)`: render into the named output buffer
    fn fexec(
        &self,
        state: &State,
        name: &str,
        outfile: &str,
        args: Vec<Value>,
    ) -> Result<(), Error> {
        let name = self.template_name(name)?;
        let tmpl = state.env().get_template(&name)?;

        if outfile.is_empty() {
            let ctx = self.root.with_payload(Payload::from_args(args), false);
            self.nested(|| tmpl.render_to_write(ctx.into_value(), std::io::sink()))?;
            return Ok(());
        }

        let has_data = self.outputs().open(outfile);
        tracing::debug!(template = %name, outfile, has_data, "fexec");

        let ctx = self.root.with_payload(Payload::from_args(args), has_data);
        let writer = BufferWriter {
            outputs: &self.outputs,
            name: outfile,
        };
        self.nested(|| tmpl.render_to_write(ctx.into_value(), writer))?;
        Ok(())
    }
}

/// Delimiter and whitespace settings taken from the plugin parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    /// Expression start, `left`
    pub left: String,
    /// Expression end, `right`
    pub right: String,
    /// Statement start, `block_left`
    pub block_left: String,
    /// Statement end, `block_right`
    pub block_right: String,
    /// Comment start, `comment_left`
    pub comment_left: String,
    /// Comment end, `comment_right`
    pub comment_right: String,
    /// Drop the first newline after a statement tag
    pub trim_blocks: bool,
    /// Strip leading whitespace before a statement tag
    pub lstrip_blocks: bool,
}

impl Default for Syntax {
    fn default() -> Self {
        Syntax {
            left: DEFAULT_LEFT.to_string(),
            right: DEFAULT_RIGHT.to_string(),
            block_left: DEFAULT_BLOCK_LEFT.to_string(),
            block_right: DEFAULT_BLOCK_RIGHT.to_string(),
            comment_left: DEFAULT_COMMENT_LEFT.to_string(),
            comment_right: DEFAULT_COMMENT_RIGHT.to_string(),
            trim_blocks: false,
            lstrip_blocks: false,
        }
    }
}

impl Syntax {
    /// Read delimiter overrides; empty values keep the defaults
    pub fn from_params(params: &Params) -> Self {
        let pick = |key: &str, default: &str| match params.get(key) {
            "" => default.to_string(),
            v => v.to_string(),
        };
        Syntax {
            left: pick("left", DEFAULT_LEFT),
            right: pick("right", DEFAULT_RIGHT),
            block_left: pick("block_left", DEFAULT_BLOCK_LEFT),
            block_right: pick("block_right", DEFAULT_BLOCK_RIGHT),
            comment_left: pick("comment_left", DEFAULT_COMMENT_LEFT),
            comment_right: pick("comment_right", DEFAULT_COMMENT_RIGHT),
            trim_blocks: params.bool("trim_blocks", false),
            lstrip_blocks: params.bool("lstrip_blocks", false),
        }
    }

    fn config(&self) -> Result<SyntaxConfig, GeneratorError> {
        SyntaxConfig::builder()
            .block_delimiters(self.block_left.clone(), self.block_right.clone())
            .variable_delimiters(self.left.clone(), self.right.clone())
            .comment_delimiters(self.comment_left.clone(), self.comment_right.clone())
            .build()
            .map_err(|e| GeneratorError::InvalidConfig(format!("template delimiters: {}", e)))
    }
}

/// Compiled templates plus the output of one generation run
pub struct Engine {
    env: Environment<'static>,
    run: Arc<RunState>,
}

impl Engine {
    /// Create an engine for one request
    ///
    /// The delimiters and whitespace handling come from `params`; the
    /// function library is bound to `request`.
    pub fn new(request: Arc<DescriptorSet>, params: Params) -> Result<Self, GeneratorError> {
        let syntax = Syntax::from_params(&params);
        let run = Arc::new(RunState {
            root: Root::new(request.clone(), Arc::new(params)),
            outputs: Mutex::new(OutputFiles::default()),
            default_template: OnceCell::new(),
            depth: AtomicUsize::new(0),
        });

        let mut env = Environment::new();
        env.set_syntax(syntax.config()?);
        env.set_trim_blocks(syntax.trim_blocks);
        env.set_lstrip_blocks(syntax.lstrip_blocks);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        funcs::register(&mut env, request);
        predicates::register(&mut env);

        let shared = run.clone();
        env.add_function(
            "exec",
            move |state: &State, name: String, args: Rest<Value>| -> Result<String, Error> {
                shared.exec(state, &name, args.0)
            },
        );
        let shared = run.clone();
        env.add_function(
            "fexec",
            move |state: &State, name: String, outfile: String, args: Rest<Value>| -> Result<String, Error> {
                shared.fexec(state, &name, &outfile, args.0)?;
                Ok(String::new())
            },
        );

        Ok(Engine { env, run })
    }

    /// Register a template from source
    ///
    /// The first template added also answers to the empty name.
    pub fn add_template(&mut self, name: &str, source: String) -> Result<(), GeneratorError> {
        self.env
            .add_template_owned(name.to_string(), source)
            .map_err(|e| GeneratorError::TemplateLoadError(error_chain(&e)))?;
        let _ = self.run.default_template.set(name.to_string());
        tracing::debug!(template = name, "loaded template");
        Ok(())
    }

    /// Load a template file, registered under its base name
    ///
    /// Returns the name the template was registered under.
    pub fn load_file(&mut self, path: &str) -> Result<String, GeneratorError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| GeneratorError::TemplateLoadError(format!("{}: {}", path, e)))?;
        let name = template_name(path);
        self.add_template(&name, source)?;
        Ok(name)
    }

    /// Run an entry template against the root context
    ///
    /// Whatever the entry renders itself is discarded.
    pub fn execute(&self, name: &str) -> Result<(), GeneratorError> {
        tracing::debug!(template = name, "executing entry template");
        let name = self
            .run
            .template_name(name)
            .map_err(|e| GeneratorError::RenderError(error_chain(&e)))?;
        let tmpl = self
            .env
            .get_template(&name)
            .map_err(|e| GeneratorError::RenderError(error_chain(&e)))?;
        tmpl.render_to_write(self.run.root.clone().into_value(), std::io::sink())
            .map_err(|e| GeneratorError::RenderError(error_chain(&e)))?;
        Ok(())
    }

    /// Render a template with the given arguments and return its text
    pub fn render(&self, name: &str, args: Vec<Value>) -> Result<String, GeneratorError> {
        let name = self
            .run
            .template_name(name)
            .map_err(|e| GeneratorError::RenderError(error_chain(&e)))?;
        let ctx = self.run.root.with_payload(Payload::from_args(args), false);
        self.env
            .get_template(&name)
            .and_then(|tmpl| tmpl.render(ctx.into_value()))
            .map_err(|e| GeneratorError::RenderError(error_chain(&e)))
    }

    /// Whether the named output buffer holds data
    pub fn has_data(&self, outfile: &str) -> bool {
        self.run.outputs().has_data(outfile)
    }

    /// Take every output buffer, in creation order
    pub fn take_files(&self) -> Vec<(String, String)> {
        self.run.outputs().take_files()
    }
}

/// Name a template file is registered under
pub fn template_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Render an error with everything that caused it
fn error_chain(err: &Error) -> String {
    let mut msg = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
