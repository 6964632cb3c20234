//! Handler lookup for module kinds.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ModuleContext, ModuleKind, ModuleOutcome};
use crate::task::Subtask;

/// A pipeline stage.
///
/// Implementations drive `subtask` to a terminal state themselves, report
/// problems through the context log, and never panic on missing inputs.
#[async_trait]
pub trait ReconModule: Send + Sync {
    fn kind(&self) -> ModuleKind;

    async fn run(&self, ctx: &ModuleContext, subtask: &Subtask) -> ModuleOutcome;
}

#[derive(Default, Clone)]
pub struct ModuleRegistry {
    handlers: HashMap<ModuleKind, Arc<dyn ReconModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own kind, replacing any previous one.
    pub fn register(&mut self, module: Arc<dyn ReconModule>) {
        self.handlers.insert(module.kind(), module);
    }

    pub fn with(mut self, module: Arc<dyn ReconModule>) -> Self {
        self.register(module);
        self
    }

    pub fn get(&self, kind: ModuleKind) -> Option<Arc<dyn ReconModule>> {
        self.handlers.get(&kind).cloned()
    }

    /// Kinds with a handler, in pipeline order.
    pub fn kinds(&self) -> Vec<ModuleKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    struct Noop(ModuleKind);

    #[async_trait]
    impl ReconModule for Noop {
        fn kind(&self) -> ModuleKind {
            self.0
        }

        async fn run(&self, _ctx: &ModuleContext, subtask: &Subtask) -> ModuleOutcome {
            subtask.set_status(TaskStatus::Completed);
            ModuleOutcome::Finished
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ModuleRegistry::new()
            .with(Arc::new(Noop(ModuleKind::JsCrawler)))
            .with(Arc::new(Noop(ModuleKind::Subfinder)));

        assert!(registry.get(ModuleKind::Subfinder).is_some());
        assert!(registry.get(ModuleKind::Fuzzer).is_none());
        assert_eq!(
            registry.kinds(),
            vec![ModuleKind::Subfinder, ModuleKind::JsCrawler]
        );
    }
}
