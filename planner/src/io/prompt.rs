//! Planning prompt builder.
//!
//! The template is rendered with minijinja, split on section markers, and
//! trimmed to a byte budget by dropping optional sections.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::{debug, warn};

use crate::io::plan_store::EXECUTION_PLAN_SCHEMA;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");

/// System instruction sent with every planning request.
pub const SYSTEM_PROMPT: &str = "You are a planning assistant for a photography studio CRM. \
You break user requests into tool calls and answer with a single JSON object that follows the \
given schema exactly.";

/// Optional sections, least important first.
const DROP_ORDER: [&str; 1] = ["guidelines"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex is valid")
});

/// A section of rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Content after the marker, including the section header.
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
///
/// Empty droppable sections are skipped.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    // (marker start, marker end, key, required)
    let markers: Vec<(usize, usize, &str, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::with_capacity(markers.len());
    for (i, &(_, start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map_or(rendered.len(), |&(next_start, ..)| next_start);
        let content = rendered[start..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop optional sections in [`DROP_ORDER`] until the prompt fits `budget`.
///
/// Required sections are never dropped or cut; a prompt that is still over
/// budget is sent as is.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let removed = sections.remove(idx);
            debug!(
                section = key,
                bytes_dropped = removed.content.len(),
                "dropped section for budget"
            );
        }
    }
    let total = total_len(sections);
    if total > budget {
        warn!(
            prompt_bytes = total,
            budget_bytes = budget,
            "planning prompt exceeds budget with only required sections"
        );
    }
}

fn join_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Inputs for one planning prompt.
#[derive(Debug, Clone, Copy)]
pub struct PlanPromptInputs<'a> {
    /// The user's request, embedded verbatim.
    pub request: &'a str,
    /// Output of [`crate::catalog::ToolCatalog::listing`].
    pub tool_listing: &'a str,
}

/// Builds planning prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build(&self, input: &PlanPromptInputs<'_>) -> Result<PromptPack> {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .context("load planner template")?;
        let rendered = env
            .get_template("planner")?
            .render(context! {
                request => input.request.trim(),
                tools => input.tool_listing.trim(),
                schema => EXECUTION_PLAN_SCHEMA.trim(),
            })
            .context("render planner template")?;

        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        let content = join_sections(&sections);
        debug!(
            prompt_bytes = content.len(),
            sections = sections.len(),
            "built planning prompt"
        );
        Ok(PromptPack { content })
    }
}

/// A rendered planning prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn into_string(self) -> String {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "- create_invoice: Create an invoice\n- global_search: Search";

    fn build(budget: usize, request: &str, listing: &str) -> String {
        PromptBuilder::new(budget)
            .build(&PlanPromptInputs {
                request,
                tool_listing: listing,
            })
            .expect("build")
            .into_string()
    }

    #[test]
    fn sections_appear_in_order() {
        let content = build(100_000, "Find Simon Parrott", LISTING);
        let positions: Vec<usize> = [
            "### Planner Contract",
            "### Request",
            "### Tools",
            "### Output Schema",
            "### Guidelines",
            "### Worked Example",
        ]
        .iter()
        .map(|header| content.find(header).expect(header))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        assert!(!content.contains("<!-- section:"));
    }

    #[test]
    fn embeds_request_listing_and_schema_verbatim() {
        let request = "Send <Simon> an invoice for €295 & a gallery";
        let content = build(100_000, request, LISTING);
        assert!(content.contains(request));
        assert!(content.contains(LISTING));
        assert!(content.contains("\"user_confirmations_required\""));
        assert!(content.contains("\"from_step_step_1\""));
    }

    #[test]
    fn empty_catalog_is_stated() {
        let content = build(100_000, "anything", "");
        assert!(content.contains("(no tools registered)"));
    }

    #[test]
    fn budget_drops_guidelines_but_keeps_example() {
        let content = build(10, "req", LISTING);
        assert!(!content.contains("### Guidelines"));
        for required in [
            "### Planner Contract",
            "### Request",
            "### Tools",
            "### Output Schema",
            "### Worked Example",
        ] {
            assert!(content.contains(required), "{required} kept");
        }
        assert!(content.contains("\"from_step_step_1\""));
    }

    #[test]
    fn parse_sections_keeps_empty_required_only() {
        let rendered = "<!-- section:a required -->\n\n<!-- section:b droppable -->\n  \n\
                        <!-- section:c droppable -->\nbody";
        let sections = parse_sections(rendered);
        let keys: Vec<&str> = sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(sections[1].content, "body");
    }
}
