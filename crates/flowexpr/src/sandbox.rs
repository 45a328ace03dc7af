//! Isolated script evaluation backed by rhai.
//!
//! The engine has no file, network or module access, `eval` is disabled and
//! `print`/`debug` output is discarded. Every [`Session::evaluate`] call runs
//! against a fresh scope holding only the bindings passed in, and results
//! are converted back into plain [`Value`]s.

use crate::SandboxError;
use flowcore::Value;
use parking_lot::Mutex;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, Scope, AST};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Limits applied to every script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    /// Compiled scripts kept for reuse; the cache is flushed when full.
    pub cache_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
            cache_capacity: 512,
        }
    }
}

pub struct Sandbox {
    engine: Engine,
    cache: Mutex<HashMap<String, Arc<AST>>>,
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        let mut engine = Engine::new();
        engine
            .set_module_resolver(DummyModuleResolver::new())
            .set_max_modules(0)
            .set_max_operations(config.max_operations)
            .set_max_call_levels(config.max_call_levels)
            .set_max_expr_depths(config.max_expr_depth, config.max_expr_depth)
            .set_max_string_size(config.max_string_size)
            .set_max_array_size(config.max_array_size)
            .set_max_map_size(config.max_map_size);
        engine.disable_symbol("eval");
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});

        Self {
            engine,
            cache: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Compile `script` into a reusable session. Parse failures surface here,
    /// never as a silent false at evaluation time.
    pub fn create_session(&self, script: &str) -> Result<Session<'_>, SandboxError> {
        if let Some(ast) = self.cache.lock().get(script) {
            return Ok(Session {
                engine: &self.engine,
                ast: Arc::clone(ast),
            });
        }

        let ast = self
            .engine
            .compile(script)
            .map_err(|e| SandboxError::Parse {
                script: script.to_string(),
                message: e.to_string(),
            })?;
        let ast = Arc::new(ast);

        let mut cache = self.cache.lock();
        if cache.len() >= self.config.cache_capacity {
            tracing::debug!(entries = cache.len(), "flushing compiled script cache");
            cache.clear();
        }
        cache.insert(script.to_string(), Arc::clone(&ast));

        Ok(Session {
            engine: &self.engine,
            ast,
        })
    }

    /// Parse-only check.
    pub fn check(&self, script: &str) -> Result<(), SandboxError> {
        self.create_session(script).map(|_| ())
    }

    pub fn cached_scripts(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

/// A compiled script bound to the sandbox engine. Holds no evaluation state.
pub struct Session<'a> {
    engine: &'a Engine,
    ast: Arc<AST>,
}

impl Session<'_> {
    /// Run the script with exactly `bindings` in scope, as read-only constants.
    pub fn evaluate(&self, bindings: &HashMap<String, Value>) -> Result<Value, SandboxError> {
        let mut scope = Scope::new();
        for (name, value) in bindings {
            let dynamic = rhai::serde::to_dynamic(value).map_err(|e| SandboxError::Binding {
                name: name.clone(),
                message: e.to_string(),
            })?;
            scope.push_constant_dynamic(name.clone(), dynamic);
        }

        let result: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, &self.ast)
            .map_err(|e| SandboxError::Runtime(e.to_string()))?;

        rhai::serde::from_dynamic::<Value>(&result).map_err(|e| {
            SandboxError::Output(format!("{} ({})", e, result.type_name()))
        })
    }
}
