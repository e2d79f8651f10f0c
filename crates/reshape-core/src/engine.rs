use crate::config::ReshapeConfig;
use crate::error::ReshapeError;
use crate::getset::Reshaper;
use crate::observer::ExecutionObserver;
use crate::runtime::{Context, EvalResult, Operator, Operators, State, evaluate};
use serde_json::Value;
use std::sync::Arc;

/// Engine-scoped execution surface.
///
/// Operator registration is instance-local (no global registry), so hosts
/// can run engines with different `x.*` extensions side by side. An engine
/// is `Send + Sync`; per-run state lives in the caller's [`State`].
#[derive(Default)]
pub struct Engine {
    operators: Operators,
    reshaper: Reshaper,
}

impl Engine {
    /// Create an engine with core operators and the host modules preloaded.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &ReshapeConfig) -> Self {
        Self {
            operators: Operators::new(),
            reshaper: Reshaper::new(config.options()),
        }
    }

    /// Attach a completion observer to every GetSet call made through this
    /// engine, including calls from scripts.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.reshaper = self.reshaper.with_observer(observer);
        self
    }

    /// Register or replace an operator, typically in `x.*`.
    pub fn register(&mut self, name: impl Into<String>, operator: Operator) -> Option<Operator> {
        self.operators.register(name, operator)
    }

    /// Evaluate a script expression against caller-managed state.
    pub fn run(&self, expr: &Value, state: &mut State) -> EvalResult {
        let mut ctx = Context {
            state,
            operators: &self.operators,
            reshaper: &self.reshaper,
        };
        evaluate(expr, &mut ctx)
    }

    pub fn get_set(&self, document: &str, rules: &str) -> Result<String, ReshapeError> {
        self.reshaper.get_set(document, rules)
    }

    pub fn operators(&self) -> &Operators {
        &self.operators
    }

    pub fn reshaper(&self) -> &Reshaper {
        &self.reshaper
    }
}
