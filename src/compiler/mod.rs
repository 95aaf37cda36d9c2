//! Flow-to-source compilation.
//!
//! [`Compiler`] owns a registry of [`Backend`]s keyed by [`Lang`] and the
//! per-backend step whitelist. Compiling a flow validates it, checks the
//! whitelist of the selected target, gathers every declaration into a
//! [`Scope`], then hands a [`Unit`] to the backend. Expression text for every
//! backend comes from the one [`ExprCompiler`].

use crate::analysis::OpsWhitelist;
use crate::backend::{Backend, Lang, default_backends};
use crate::diagnostics::{DiagnosticSink, LogLevel, TracingSink};
use crate::error::FlowError;
use crate::ir::Flow;
use ahash::AHashMap;
use std::sync::Arc;

mod expr;
mod scope;
pub mod types;
mod writer;

pub use expr::{ExprCompiler, ident, literal, string_literal};
pub(crate) use expr::segment;
pub use scope::{MapScope, Scope};
pub use types::{type_name, zero_value};
pub use writer::CodeWriter;

/// Everything a backend needs to render one flow.
pub struct Unit<'f> {
    pub flow: &'f Flow,
    pub exprs: ExprCompiler,
    pub scope: Scope,
    pub sink: &'f dyn DiagnosticSink,
    counter: usize,
}

impl<'f> Unit<'f> {
    pub fn new(flow: &'f Flow, sink: &'f dyn DiagnosticSink) -> Result<Self, FlowError> {
        let mut exprs = ExprCompiler::default();
        let scope = Scope::discover(flow, &mut exprs)?;
        Ok(Self {
            flow,
            exprs,
            scope,
            sink,
            counter: 0,
        })
    }

    /// A fresh number for generated helper names (`__step_0`, `_map_1`, ...).
    pub fn next_id(&mut self) -> usize {
        let id = self.counter;
        self.counter += 1;
        id
    }

    pub fn warn(&self, message: &str) {
        self.sink.emit(LogLevel::Warn, message);
    }
}

pub struct Compiler {
    backends: AHashMap<Lang, Box<dyn Backend>>,
    whitelist: OpsWhitelist,
    sink: Arc<dyn DiagnosticSink>,
    skip_whitelist: bool,
}

pub struct CompilerBuilder {
    backends: AHashMap<Lang, Box<dyn Backend>>,
    overrides: Vec<(Lang, Vec<String>)>,
    sink: Arc<dyn DiagnosticSink>,
    skip_whitelist: bool,
}

impl Default for CompilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerBuilder {
    pub fn new() -> Self {
        let backends = default_backends()
            .into_iter()
            .map(|backend| (backend.lang(), backend))
            .collect();
        Self {
            backends,
            overrides: Vec::new(),
            sink: Arc::new(TracingSink),
            skip_whitelist: false,
        }
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the step whitelist of `lang`.
    pub fn with_allowed_ops<I, S>(mut self, lang: Lang, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides
            .push((lang, ops.into_iter().map(Into::into).collect()));
        self
    }

    /// Registers a backend, replacing any existing one for the same language.
    pub fn with_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backends.insert(backend.lang(), backend);
        self
    }

    pub fn without_backend(mut self, lang: Lang) -> Self {
        self.backends.remove(&lang);
        self
    }

    pub fn skip_whitelist(mut self, skip: bool) -> Self {
        self.skip_whitelist = skip;
        self
    }

    pub fn build(self) -> Compiler {
        let mut whitelist =
            OpsWhitelist::from_backends(self.backends.values().map(Box::as_ref));
        for (lang, ops) in self.overrides {
            if self.backends.contains_key(&lang) {
                whitelist.allow(lang, ops);
            }
        }
        Compiler {
            backends: self.backends,
            whitelist,
            sink: self.sink,
            skip_whitelist: self.skip_whitelist,
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        CompilerBuilder::new().build()
    }
}

impl Compiler {
    pub fn builder() -> CompilerBuilder {
        CompilerBuilder::new()
    }

    pub fn whitelist(&self) -> &OpsWhitelist {
        &self.whitelist
    }

    /// Languages with a registered backend, in id order.
    pub fn languages(&self) -> Vec<Lang> {
        let mut langs: Vec<Lang> = self.backends.keys().copied().collect();
        langs.sort_by_key(|lang| lang.as_str());
        langs
    }

    /// Renders `flow` as source text for `lang`.
    pub fn compile(&self, flow: &Flow, lang: Lang) -> Result<String, FlowError> {
        let backend = self
            .backends
            .get(&lang)
            .ok_or_else(|| FlowError::compile(lang, "backend is not registered"))?;
        flow.validate()?;
        if !self.skip_whitelist {
            self.whitelist.check(flow, lang)?;
        }

        let mut unit = Unit::new(flow, self.sink.as_ref())?;
        let source = backend.generate(&mut unit)?;
        tracing::debug!(
            flow = %flow.name,
            target = %lang,
            bytes = source.len(),
            "compiled flow"
        );
        Ok(source)
    }
}
