use super::{Control, Interpreter, array_at};
use crate::context::Context;
use crate::error::FlowError;
use crate::ir::{Path, Step, Value};
use rayon::prelude::*;

impl Interpreter {
    /// Runs `body` once per source element, each on a private copy of the context.
    ///
    /// Results come back in source order whatever order the tasks finish in.
    /// The first failure fails the whole step and nothing is returned for the others.
    pub(super) fn run_map(
        &self,
        source: &Path,
        alias: &str,
        body: &[Step],
        context: &Context,
    ) -> Result<Vec<Value>, FlowError> {
        let items = array_at(source, context, "map")?;
        tracing::debug!(source = %source, tasks = items.len(), "fanning out map");

        let fan_out = || {
            items
                .par_iter()
                .map(|item| self.map_element(alias, body, item, context))
                .collect::<Result<Vec<_>, _>>()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(fan_out),
            None => fan_out(),
        };
        if let Err(e) = &results {
            tracing::debug!(source = %source, error = %e, "map failed; discarding results");
        }
        results
    }

    // A task's result is its `return` value, or the alias as the body left it.
    fn map_element(
        &self,
        alias: &str,
        body: &[Step],
        item: &Value,
        shared: &Context,
    ) -> Result<Value, FlowError> {
        let mut private = shared.clone();
        private.bind(alias, item.clone());
        match self.run(body, &mut private)? {
            Control::Return(value) => Ok(value),
            Control::Continue => private.resolve(&Path::name(alias)),
        }
    }
}
