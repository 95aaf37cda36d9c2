//! Host-supplied implementations of the functions a flow calls.

use crate::error::ExternalCallError;
use crate::ir::Value;
use ahash::AHashMap;
use futures::future::{self, BoxFuture};

/// Resolves `call` steps and expressions to host functions.
///
/// Implementations must not assume they are called in any particular order or
/// only once per run; `map` bodies may call them from several threads at once.
pub trait FunctionResolver: Send + Sync {
    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ExternalCallError>;

    /// Entry point for calls flagged `async`. Defaults to a ready future around [`call`](Self::call).
    fn call_async<'a>(
        &'a self,
        function: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, Result<Value, ExternalCallError>> {
        Box::pin(future::ready(self.call(function, &args)))
    }
}

/// Rejects every call. The default for flows that never call out.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl FunctionResolver for NoResolver {
    fn call(&self, function: &str, _args: &[Value]) -> Result<Value, ExternalCallError> {
        Err(ExternalCallError::new(function, "no function resolver is configured"))
    }
}

type HostFn = Box<dyn Fn(&[Value]) -> Result<Value, ExternalCallError> + Send + Sync>;

/// A name to closure registry.
///
/// ```
/// use jsonflow::resolver::{FnResolver, FunctionResolver};
/// use jsonflow::ir::Value;
///
/// let resolver = FnResolver::new().register("double", |args| {
///     Ok(Value::Integer(args.first().and_then(|v| v.as_f64()).unwrap_or(0.0) as i64 * 2))
/// });
/// assert_eq!(resolver.call("double", &[Value::Integer(4)]).unwrap(), Value::Integer(8));
/// ```
#[derive(Default)]
pub struct FnResolver {
    functions: AHashMap<String, HostFn>,
}

impl FnResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ExternalCallError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Box::new(function));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl std::fmt::Debug for FnResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FnResolver").field("functions", &names).finish()
    }
}

impl FunctionResolver for FnResolver {
    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ExternalCallError> {
        let host = self
            .functions
            .get(function)
            .ok_or_else(|| ExternalCallError::new(function, "function is not registered"))?;
        host(args)
    }
}
