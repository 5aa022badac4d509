//! Capability catalog: the tools a plan may invoke.
//!
//! The catalog is built once by the embedding application and passed by
//! reference to the synthesizer and the executor. Both only read it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde_json::{Map, Value};

/// Rendered in the tool listing when a tool has no description.
pub const MISSING_DESCRIPTION: &str = "No description available";

/// Per-invocation context handed to a tool handler.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    pub step_id: &'a str,
    pub tool: &'a str,
    /// Caller-supplied context, passed through untouched.
    pub caller: &'a Value,
    /// Step deadline, when the executor enforces one.
    pub deadline: Option<Instant>,
}

/// Invocable side of a tool.
pub trait ToolHandler: Send + Sync {
    fn invoke(&self, parameters: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value>;
}

struct FnTool<F>(F);

impl<F> ToolHandler for FnTool<F>
where
    F: Fn(&Map<String, Value>, &ToolContext<'_>) -> Result<Value> + Send + Sync,
{
    fn invoke(&self, parameters: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value> {
        (self.0)(parameters, ctx)
    }
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolEntry {
    pub description: Option<String>,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolEntry {
    /// Description for prompts; never blank.
    pub fn description(&self) -> &str {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(MISSING_DESCRIPTION)
    }
}

/// Tools keyed by exact, case-sensitive name.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, ToolEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any tool with the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        handler: impl ToolHandler + 'static,
    ) -> &mut Self {
        self.tools.insert(
            name.into(),
            ToolEntry {
                description,
                handler: Arc::new(handler),
            },
        );
        self
    }

    /// Register a closure as a tool.
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&Map<String, Value>, &ToolContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, Some(description.into()), FnTool(f))
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// One `- <name>: <description>` line per tool, sorted by name.
    pub fn listing(&self) -> String {
        self.tools
            .iter()
            .map(|(name, entry)| format!("- {name}: {}", entry.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(_: &Map<String, Value>, _: &ToolContext<'_>) -> Result<Value> {
        Ok(Value::Null)
    }

    #[test]
    fn listing_is_sorted_and_never_blank() {
        let mut catalog = ToolCatalog::new();
        catalog
            .register_fn("global_search", "Search clients and galleries", noop)
            .register_fn("create_invoice", "   ", noop)
            .register_fn("archive", "Archive a gallery", noop);

        assert_eq!(
            catalog.listing(),
            "- archive: Archive a gallery\n\
             - create_invoice: No description available\n\
             - global_search: Search clients and galleries"
        );
    }

    #[test]
    fn listing_is_stable_across_reads() {
        let mut catalog = ToolCatalog::new();
        catalog.register_fn("b", "second", noop).register_fn("a", "first", noop);
        assert_eq!(catalog.listing(), catalog.listing());
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut catalog = ToolCatalog::new();
        catalog.register_fn("global_search", "search", noop);
        assert!(catalog.contains("global_search"));
        assert!(!catalog.contains("Global_Search"));
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["global_search"]);
    }

    #[test]
    fn handlers_receive_parameters_and_context() {
        let mut catalog = ToolCatalog::new();
        catalog.register_fn(
            "echo",
            "echo parameters",
            |params: &Map<String, Value>, ctx: &ToolContext<'_>| {
                Ok(json!({"params": params, "step": ctx.step_id, "caller": ctx.caller}))
            },
        );

        let mut params = Map::new();
        params.insert("q".to_string(), json!("x"));
        let caller = json!({"user": "u1"});
        let ctx = ToolContext {
            step_id: "s1",
            tool: "echo",
            caller: &caller,
            deadline: None,
        };
        let out = catalog
            .get("echo")
            .expect("tool")
            .handler
            .invoke(&params, &ctx)
            .expect("invoke");
        assert_eq!(
            out,
            json!({"params": {"q": "x"}, "step": "s1", "caller": {"user": "u1"}})
        );
    }
}
