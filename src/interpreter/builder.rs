use super::Interpreter;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::resolver::{FunctionResolver, NoResolver};
use std::sync::Arc;

/// Configures an [`Interpreter`].
///
/// ```
/// use jsonflow::interpreter::Interpreter;
/// use jsonflow::diagnostics::MemorySink;
/// use std::sync::Arc;
///
/// let interpreter = Interpreter::builder()
///     .sink(Arc::new(MemorySink::new()))
///     .map_threads(4)
///     .build();
/// ```
#[derive(Default)]
pub struct InterpreterBuilder {
    resolver: Option<Arc<dyn FunctionResolver>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    map_threads: Option<usize>,
}

impl InterpreterBuilder {
    /// Host functions used by `call` steps and expressions.
    pub fn resolver(mut self, resolver: Arc<dyn FunctionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Receives `log` step output and interpreter warnings.
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Runs `map` bodies on a dedicated pool of `threads` workers instead of the global rayon pool.
    pub fn map_threads(mut self, threads: usize) -> Self {
        self.map_threads = Some(threads);
        self
    }

    pub fn build(self) -> Interpreter {
        let pool = self.map_threads.and_then(|threads| {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("jsonflow-map-{}", i))
                .build()
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    tracing::warn!(threads, error = %e, "falling back to the global rayon pool");
                    None
                }
            }
        });

        Interpreter {
            resolver: self.resolver.unwrap_or_else(|| Arc::new(NoResolver)),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            pool,
        }
    }
}
