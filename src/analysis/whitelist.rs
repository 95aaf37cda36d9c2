use crate::backend::{Backend, Lang, default_backends};
use crate::error::FlowError;
use crate::ir::Flow;
use std::collections::{BTreeMap, BTreeSet};

/// The step tags each registered backend may compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpsWhitelist {
    allowed: BTreeMap<Lang, BTreeSet<String>>,
}

impl OpsWhitelist {
    /// Whitelists taken from each backend's defaults.
    pub fn from_backends<'a>(backends: impl IntoIterator<Item = &'a dyn Backend>) -> Self {
        let allowed = backends
            .into_iter()
            .map(|backend| {
                let ops = backend
                    .default_allowed_ops()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                (backend.lang(), ops)
            })
            .collect();
        Self { allowed }
    }

    /// Defaults of the four built-in backends.
    pub fn builtin() -> Self {
        let backends = default_backends();
        Self::from_backends(backends.iter().map(Box::as_ref))
    }

    pub fn allow<I, S>(&mut self, lang: Lang, ops: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed
            .insert(lang, ops.into_iter().map(Into::into).collect());
    }

    pub fn remove(&mut self, lang: Lang) {
        self.allowed.remove(&lang);
    }

    pub fn allowed(&self, lang: Lang) -> Option<&BTreeSet<String>> {
        self.allowed.get(&lang)
    }

    /// Fails with `BackendUnsupported` naming every used tag `lang` does not allow.
    pub fn check(&self, flow: &Flow, lang: Lang) -> Result<(), FlowError> {
        let Some(allowed) = self.allowed.get(&lang) else {
            return Err(FlowError::BackendUnsupported {
                backend: lang.to_string(),
                ops: used_ops(flow).into_iter().map(str::to_string).collect(),
            });
        };
        let disallowed: Vec<String> = used_ops(flow)
            .into_iter()
            .filter(|op| !allowed.contains(*op))
            .map(str::to_string)
            .collect();
        if disallowed.is_empty() {
            Ok(())
        } else {
            tracing::debug!(backend = %lang, ops = ?disallowed, "whitelist rejected flow");
            Err(FlowError::BackendUnsupported {
                backend: lang.to_string(),
                ops: disallowed,
            })
        }
    }

    /// Checks every registered backend in order of backend id; reports the first failure.
    pub fn validate_all(&self, flow: &Flow) -> Result<(), FlowError> {
        let mut langs: Vec<Lang> = self.allowed.keys().copied().collect();
        langs.sort_by_key(|lang| lang.as_str());
        langs.into_iter().try_for_each(|lang| self.check(flow, lang))
    }
}

/// The distinct step tags at the top level of `flow`.
pub fn used_ops(flow: &Flow) -> BTreeSet<&'static str> {
    flow.steps.iter().map(|step| step.tag()).collect()
}

/// Validates `flow` against every backend in `whitelist`.
pub fn validate_ops(flow: &Flow, whitelist: &OpsWhitelist) -> Result<(), FlowError> {
    whitelist.validate_all(flow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solidity_rejects_map_and_try_by_default() {
        let whitelist = OpsWhitelist::builtin();
        let solidity = whitelist.allowed(Lang::Solidity).unwrap();
        assert!(!solidity.contains("map"));
        assert!(!solidity.contains("try"));
        assert_eq!(whitelist.allowed(Lang::Rust).unwrap().len(), 10);
    }
}
