//! Model backend abstraction.
//!
//! Phase logic talks to a [`Backend`] trait object, never to a concrete
//! provider, so runs can be driven by a real API client or a scripted test
//! double interchangeably. Backends are looked up by name through the
//! factory registry.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::errors::BackendError;

/// A completed backend call: the schema-shaped result plus what it cost.
#[derive(Debug, Clone, Default)]
pub struct Assessment {
    pub result: Value,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Assessment {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One conversational model provider.
///
/// Implementations must enforce the requested output schema and must surface
/// budget exhaustion as [`BackendError::BudgetExceeded`], distinct from
/// transient API failures.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Request a schema-shaped completion and report token usage.
    async fn assess(
        &self,
        schema: &str,
        prompt: &str,
        system: &str,
        max_tokens: u32,
    ) -> Result<Assessment, BackendError>;

    /// Switch the model used by subsequent calls.
    fn set_model(&mut self, model: &str);

    /// Release any held connections. Idempotent.
    async fn close(&mut self) {}
}

type BackendBuilder = Arc<dyn Fn(&str) -> Box<dyn Backend> + Send + Sync>;

/// Registry mapping backend names to constructors.
///
/// Providers register a builder once; callers construct by name and get a
/// [`BackendError::UnknownBackend`] for anything unregistered.
#[derive(Default, Clone)]
pub struct BackendFactory {
    builders: BTreeMap<String, BackendBuilder>,
}

impl BackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&str) -> Box<dyn Backend> + Send + Sync + 'static,
    {
        self.builders.insert(name.to_string(), Arc::new(builder));
    }

    /// Construct the named backend with `model` as its starting model.
    pub fn create(&self, name: &str, model: &str) -> Result<Box<dyn Backend>, BackendError> {
        match self.builders.get(name) {
            Some(builder) => Ok(builder(model)),
            None => Err(BackendError::UnknownBackend {
                name: name.to_string(),
            }),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}

/// Maximum attempts for a single logical backend call.
const MAX_ATTEMPTS: u32 = 3;

/// Call the backend, retrying transient failures up to three attempts.
///
/// Budget exhaustion is terminal and returns immediately; retrying a call
/// the ledger already refused would only burn more spend.
pub async fn call_with_retries(
    backend: &dyn Backend,
    schema: &str,
    prompt: &str,
    system: &str,
    max_tokens: u32,
) -> Result<Assessment, BackendError> {
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match backend.assess(schema, prompt, system, max_tokens).await {
            Ok(assessment) => return Ok(assessment),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                warn!("backend call attempt {attempt}/{MAX_ATTEMPTS} failed: {e}");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| BackendError::Api("retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedBackend {
        model: String,
        calls: AtomicU32,
        fail_first: u32,
        error: fn() -> BackendError,
    }

    impl ScriptedBackend {
        fn new(fail_first: u32, error: fn() -> BackendError) -> Self {
            Self {
                model: "test-model".to_string(),
                calls: AtomicU32::new(0),
                fail_first,
                error,
            }
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn assess(
            &self,
            schema: &str,
            prompt: &str,
            _system: &str,
            _max_tokens: u32,
        ) -> Result<Assessment, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err((self.error)());
            }
            Ok(Assessment {
                result: json!({
                    "schema": schema,
                    "model": self.model,
                    "prompt": prompt,
                }),
                input_tokens: 10,
                output_tokens: 20,
            })
        }

        fn set_model(&mut self, model: &str) {
            self.model = model.to_string();
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let backend = ScriptedBackend::new(0, || BackendError::Api("boom".into()));
        let result = call_with_retries(&backend, "interview", "hello", "sys", 2048)
            .await
            .unwrap();
        assert_eq!(result.result["schema"], json!("interview"));
        assert_eq!(result.total_tokens(), 30);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let backend = ScriptedBackend::new(2, || BackendError::Api("rate limited".into()));
        let result = call_with_retries(&backend, "s", "hello", "", 1024).await;
        assert!(result.is_ok());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let backend = ScriptedBackend::new(10, || BackendError::Api("down".into()));
        let result = call_with_retries(&backend, "s", "hello", "", 1024).await;
        assert!(matches!(result, Err(BackendError::Api(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exceeded_not_retried() {
        let backend = ScriptedBackend::new(10, || BackendError::BudgetExceeded("cap hit".into()));
        let result = call_with_retries(&backend, "s", "hello", "", 1024).await;
        assert!(matches!(result, Err(BackendError::BudgetExceeded(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_unknown_backend() {
        let factory = BackendFactory::new();
        assert!(matches!(
            factory.create("nope", "gpt-4o"),
            Err(BackendError::UnknownBackend { .. })
        ));
    }

    #[test]
    fn test_factory_registration_and_create() {
        let mut factory = BackendFactory::new();
        factory.register("scripted", |model| {
            let mut backend = ScriptedBackend::new(0, || BackendError::Api("unused".into()));
            backend.set_model(model);
            Box::new(backend)
        });

        assert_eq!(factory.names(), vec!["scripted"]);
        assert!(factory.create("scripted", "gpt-4o").is_ok());
    }
}
