use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common_types::{EventPayload, ProjectId};
use metrics::counter;
use tracing::warn;

use crate::metric_consts::PREPROCESSOR_ERRORS;

type PreprocessorFn = Arc<dyn Fn(EventPayload) -> Result<EventPayload, String> + Send + Sync>;

/// A named pure transformation over the full event payload. Preprocessors
/// may add, overwrite or remove tags, fingerprints and annotations; identity
/// fields are out of their reach by construction (see `EventPayload`).
#[derive(Clone)]
pub struct Preprocessor {
    pub name: String,
    func: PreprocessorFn,
}

impl Preprocessor {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(EventPayload) -> Result<EventPayload, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn apply(&self, payload: EventPayload) -> Result<EventPayload, String> {
        (self.func)(payload)
    }
}

/// Who decides which preprocessors run for a project. Looked up fresh at the
/// start of every chain run, so enabling or disabling one takes effect on
/// the next ingestion or reprocessing job without a restart.
pub trait PreprocessorProvider {
    fn enabled_preprocessors(&self, project_id: ProjectId) -> Vec<Preprocessor>;
}

/// The in-process provider: an explicit registry value owned by the app
/// context and passed in where needed, with its lifecycle tied to process
/// startup and shutdown.
#[derive(Default)]
pub struct PreprocessorRegistry {
    by_project: RwLock<HashMap<ProjectId, Vec<Preprocessor>>>,
}

impl PreprocessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the project's chain; registration order is execution order.
    pub fn register(&self, project_id: ProjectId, preprocessor: Preprocessor) {
        let mut by_project = self
            .by_project
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        by_project.entry(project_id).or_default().push(preprocessor);
    }

    pub fn clear(&self, project_id: ProjectId) {
        let mut by_project = self
            .by_project
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        by_project.remove(&project_id);
    }
}

impl PreprocessorProvider for PreprocessorRegistry {
    fn enabled_preprocessors(&self, project_id: ProjectId) -> Vec<Preprocessor> {
        let by_project = self
            .by_project
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        by_project.get(&project_id).cloned().unwrap_or_default()
    }
}

/// Threads the payload through each preprocessor in registration order. A
/// failing preprocessor aborts the rest of the chain and leaves a diagnostic
/// in the payload's `errors` annotation; the pipeline still stores the
/// best-effort record rather than losing the event.
pub fn run_chain(mut payload: EventPayload, preprocessors: &[Preprocessor]) -> EventPayload {
    for preprocessor in preprocessors {
        match preprocessor.apply(payload.clone()) {
            Ok(next) => payload = next,
            Err(reason) => {
                warn!(
                    event = %payload.event_id,
                    preprocessor = %preprocessor.name,
                    "preprocessor failed: {}",
                    reason
                );
                counter!(PREPROCESSOR_ERRORS, "preprocessor" => preprocessor.name.clone())
                    .increment(1);
                payload.push_error(format!("{}: {}", preprocessor.name, reason));
                break;
            }
        }
    }
    payload
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    fn tagger(name: &str, key: &'static str, value: &'static str) -> Preprocessor {
        Preprocessor::new(name, move |mut payload| {
            payload.set_tag(key, value);
            Ok(payload)
        })
    }

    #[test]
    fn chain_runs_in_registration_order() {
        let registry = PreprocessorRegistry::new();
        registry.register(1, tagger("first", "stage", "one"));
        registry.register(1, tagger("second", "stage", "two"));

        let payload = EventPayload::new(1, Utc::now());
        let processed = run_chain(payload, &registry.enabled_preprocessors(1));

        assert_eq!(processed.tag("stage"), Some("two"));
        assert!(processed.errors.is_empty());
    }

    #[test]
    fn failure_aborts_chain_and_annotates() {
        let registry = PreprocessorRegistry::new();
        registry.register(1, tagger("first", "before", "yes"));
        registry.register(
            1,
            Preprocessor::new("broken", |_| Err("boom".to_string())),
        );
        registry.register(1, tagger("third", "after", "yes"));

        let payload = EventPayload::new(1, Utc::now());
        let processed = run_chain(payload, &registry.enabled_preprocessors(1));

        assert_eq!(processed.tag("before"), Some("yes"));
        assert_eq!(processed.tag("after"), None);
        assert_eq!(processed.errors, vec!["broken: boom".to_string()]);
    }

    #[test]
    fn provider_lookup_reflects_registry_changes() {
        let registry = PreprocessorRegistry::new();
        registry.register(1, tagger("first", "stage", "one"));
        assert_eq!(registry.enabled_preprocessors(1).len(), 1);

        registry.clear(1);
        assert!(registry.enabled_preprocessors(1).is_empty());

        // Other projects are unaffected throughout.
        assert!(registry.enabled_preprocessors(2).is_empty());
    }
}
