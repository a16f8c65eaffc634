use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rhai::module_resolvers::FileModuleResolver;
use rhai::{Dynamic, Engine, Module, Scope};

/// File extension for tool scripts and on-demand libraries
pub const SCRIPT_EXTENSION: &str = "rhai";

/// Once-settable slot for a script's explicit return value.
///
/// The first `return_*` call wins; later calls are ignored.
#[derive(Clone, Default)]
pub struct ResultSlot {
    value: Arc<Mutex<Option<String>>>,
}

impl ResultSlot {
    pub fn set_once(&self, result: String) {
        let mut slot = self.value.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(result);
        }
    }

    pub fn take(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Factory for per-invocation script environments
#[derive(Clone, Default)]
pub struct ScriptRuntime {
    libraries_root: Option<PathBuf>,
}

impl ScriptRuntime {
    pub fn new(libraries_root: Option<PathBuf>) -> Self {
        Self { libraries_root }
    }

    /// Build a fresh environment; nothing is shared between invocations
    pub fn new_evaluation(&self) -> Evaluation {
        let mut engine = Engine::new();

        // `import "name" as n;` resolves <libraries_root>/<name>.rhai
        if let Some(ref root) = self.libraries_root {
            engine.set_module_resolver(FileModuleResolver::new_with_path_and_extension(
                root.clone(),
                SCRIPT_EXTENSION,
            ));
        }

        let captured = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&captured);
        engine.on_print(move |text| {
            let mut buffer = sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            buffer.push_str(text);
            buffer.push('\n');
        });

        Evaluation {
            engine,
            scope: Scope::new(),
            slot: ResultSlot::default(),
            captured,
        }
    }
}

/// One script evaluation in flight
pub struct Evaluation {
    engine: Engine,
    scope: Scope<'static>,
    slot: ResultSlot,
    captured: Arc<Mutex<String>>,
}

impl Evaluation {
    /// Bind a JSON value as a top-level variable in the script's scope
    pub fn bind(&mut self, name: &str, value: &serde_json::Value) {
        match rhai::serde::to_dynamic(value) {
            Ok(dynamic) => {
                self.scope.push_dynamic(name.to_owned(), dynamic);
            }
            Err(e) => {
                tracing::warn!(variable = name, error = %e, "failed to bind script argument");
            }
        }
    }

    /// The result slot scripts write through `return_*`
    pub fn slot(&self) -> ResultSlot {
        self.slot.clone()
    }

    /// Register a host namespace, e.g. `mcp` or `ai`
    pub fn register_module(&mut self, name: &str, module: Module) {
        self.engine.register_static_module(name, module.into());
    }

    /// Evaluate the script source and collect the outcome.
    ///
    /// A failed evaluation is an outcome, never a panic; the error text is
    /// carried alongside whatever output was captured before the failure.
    pub fn run(mut self, source: &str) -> EvalOutcome {
        let result = self.engine.eval_with_scope::<Dynamic>(&mut self.scope, source);

        let output = self
            .captured
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        match result {
            Ok(value) => EvalOutcome {
                result: self.slot.take(),
                output,
                value: if value.is_unit() { None } else { Some(value.to_string()) },
                error: None,
            },
            Err(e) => EvalOutcome {
                result: self.slot.take(),
                output,
                value: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// What a script evaluation produced
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    /// Explicit result set through `return_*`, wins over everything else
    pub result: Option<String>,
    /// Captured print output
    pub output: String,
    /// Stringified final expression, when not unit
    pub value: Option<String>,
    /// Evaluation error text, when the script failed
    pub error: Option<String>,
}

impl EvalOutcome {
    /// Whether the script failed and no explicit result was set
    pub fn is_error(&self) -> bool {
        self.result.is_none() && self.error.is_some()
    }

    /// Flatten into the tool response body: the explicit result if set,
    /// otherwise captured output plus the final expression, with an
    /// `Error: …` suffix on failure.
    pub fn into_text(self) -> String {
        if let Some(result) = self.result {
            return result;
        }

        let mut text = self.output;
        if let Some(error) = self.error {
            text.push_str(&format!("\nError: {error}"));
        } else if let Some(value) = self.value {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("Result: {value}"));
        }
        text
    }
}
