// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed registries of locally implemented MCP tools, resources, and
//! prompts. An incoming `mcp/request` whose method names a registered
//! entry is dispatched automatically and answered with `mcp/response`,
//! without the caller needing to hand-write a dispatch loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

/// A locally runnable MCP tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Invoke the tool with the JSON-RPC `params` and return its result
    /// payload, or an error message to report back as `mcp/response` error.
    async fn call(&self, arguments: Value) -> Result<Value, String>;
}

/// A locally servable MCP resource.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Read the resource addressed by `uri`.
    async fn read(&self, uri: &str) -> Result<Value, String>;
}

/// A locally renderable MCP prompt template.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    /// Render the prompt with the given arguments.
    async fn render(&self, arguments: Value) -> Result<Value, String>;
}

/// A name-keyed registry of `Arc`-shared handlers, generic over the handler
/// trait so tools, resources, and prompts share one implementation.
pub struct HandlerRegistry<H: ?Sized> {
    entries: Mutex<HashMap<String, Arc<H>>>,
}

impl<H: ?Sized> HandlerRegistry<H> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, handler: Arc<H>) {
        self.entries
            .lock()
            .expect("handler registry mutex poisoned")
            .insert(name.into(), handler);
    }

    /// Look up a handler by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<H>> {
        self.entries.lock().expect("handler registry mutex poisoned").get(name).cloned()
    }

    /// Remove a handler by name, returning it if it existed.
    pub fn remove(&self, name: &str) -> Option<Arc<H>> {
        self.entries.lock().expect("handler registry mutex poisoned").remove(name)
    }

    /// Returns `true` if a handler with `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().expect("handler registry mutex poisoned").contains_key(name)
    }

    /// Sorted list of registered names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .lock()
            .expect("handler registry mutex poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of locally runnable tools, keyed by tool name.
pub type ToolRegistry = HandlerRegistry<dyn ToolExecutor>;
/// Registry of locally servable resources, keyed by URI template.
pub type ResourceRegistry = HandlerRegistry<dyn ResourceProvider>;
/// Registry of locally renderable prompts, keyed by prompt name.
pub type PromptRegistry = HandlerRegistry<dyn PromptProvider>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolExecutor for Echo {
        async fn call(&self, arguments: Value) -> Result<Value, String> {
            Ok(arguments)
        }
    }

    #[tokio::test]
    async fn register_then_dispatch_by_name() {
        let registry: ToolRegistry = HandlerRegistry::new();
        registry.register("echo", Arc::new(Echo));
        assert!(registry.contains("echo"));
        let handler = registry.get("echo").unwrap();
        let result = handler.call(json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn unknown_name_is_absent() {
        let registry: ToolRegistry = HandlerRegistry::new();
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), Vec::<String>::new());
    }
}
