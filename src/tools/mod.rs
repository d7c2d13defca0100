//! Tool trait and registry
//!
//! Tools are deterministic, side-effect-free operations. They read the
//! context, validate arguments (from the parser or from the language model)
//! and return a candidate patch. They never write to the context.

pub mod profile;

pub use profile::{RefineSubRiskTool, SetCurrencyTool, SetGeographyTool, SetRiskProfileTool};

use crate::context::{Context, ContextPatch};
use crate::error::AdvisorError;
use crate::llm::ToolSchema;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Candidate patch plus notes worth telling the user (clamps, normalization)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutcome {
    pub patch: ContextPatch,
    pub notes: Vec<String>,
}

impl ToolOutcome {
    pub fn new(patch: ContextPatch) -> Self {
        Self {
            patch,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Trait for a single tool (deterministic execution)
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    fn execute(&self, context: &Context, arguments: &Value) -> Result<ToolOutcome>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Schemas in name order so prompts are stable
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name).map(|t| t.schema()))
            .collect()
    }

    /// Run a tool by name. Unknown names are treated like unusable input.
    pub fn invoke(&self, name: &str, context: &Context, arguments: &Value) -> Result<ToolOutcome> {
        let tool = self.get(name).ok_or_else(|| {
            warn!(tool = %name, "Unknown tool requested");
            AdvisorError::AmbiguousInput(format!("unknown tool '{}'", name))
        })?;

        let outcome = tool.execute(context, arguments)?;
        debug!(
            tool = %name,
            fields = ?outcome.patch.fields(),
            notes = outcome.notes.len(),
            "Tool executed"
        );
        Ok(outcome)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Argument helpers =================
//

pub(crate) fn string_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

/// Finite number, also accepted as a numeric string ("25", "25%")
pub(crate) fn number_arg(arguments: &Value, key: &str) -> Result<Option<f64>> {
    let value = match arguments.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse().ok(),
        Some(_) => None,
    };

    match value {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(AdvisorError::AmbiguousInput(format!(
            "'{}' must be a number",
            key
        ))),
    }
}

pub(crate) fn bool_arg(arguments: &Value, key: &str) -> bool {
    arguments.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with_tool(Arc::new(SetCurrencyTool))
            .with_tool(Arc::new(SetGeographyTool))
    }

    #[test]
    fn test_schemas_are_sorted() {
        let names: Vec<String> = registry().schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["set_currency", "set_geography"]);
    }

    #[test]
    fn test_unknown_tool_is_ambiguous_input() {
        let context = Context::new("s");
        let result = registry().invoke("delete_everything", &context, &json!({}));
        assert!(matches!(result, Err(AdvisorError::AmbiguousInput(_))));
    }

    #[test]
    fn test_number_arg_forms() {
        let args = json!({"a": 12.5, "b": "30%", "c": "lots", "d": null});
        assert_eq!(number_arg(&args, "a").unwrap(), Some(12.5));
        assert_eq!(number_arg(&args, "b").unwrap(), Some(30.0));
        assert!(number_arg(&args, "c").is_err());
        assert_eq!(number_arg(&args, "d").unwrap(), None);
        assert_eq!(number_arg(&args, "missing").unwrap(), None);
    }
}
