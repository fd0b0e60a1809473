// src/llm/prompt.rs
//
// Prompt text for the initial request and for repair followups. Assembly is
// pure string concatenation in a fixed order; identical inputs give
// byte-identical prompts.

use std::collections::BTreeMap;

use crate::context::ExampleTest;
use crate::error::ArtifactError;
use crate::llm::{ChatMessage, ChatRequest, Role};
use crate::model::{Definition, FocalFunction};
use crate::testgen::runner::RunResult;

pub const INSTRUCTIONS: &str =
    "Don't mock, use fakes. Write only the test, only one, with no imports or explanations.\n";

/* ============================================================
   Initial prompt
   ============================================================ */

pub struct PromptAssembler;

impl PromptAssembler {
    pub fn build(examples: &[ExampleTest], focal: &FocalFunction) -> String {
        Self::assemble(examples, &focal.definitions_by_package(), &focal.source)
    }

    /// Sections in order, each omitted when empty: examples, definitions
    /// grouped by package, the focal source, instructions.
    pub fn assemble(
        examples: &[ExampleTest],
        definitions: &BTreeMap<&str, Vec<&Definition>>,
        focal_source: &str,
    ) -> String {
        let mut out = String::new();

        /* ---------- EXAMPLES ---------- */
        if !examples.is_empty() {
            out.push_str("Using these tests as examples:\n");
            for ex in examples {
                fenced(&mut out, ex.content.trim_end());
                out.push('\n');
            }
            out.push('\n');
        }

        /* ---------- DEFINITIONS ---------- */
        let groups: Vec<String> = definitions
            .iter()
            .filter_map(|(pkg, defs)| package_block(pkg, defs))
            .collect();
        if !groups.is_empty() {
            out.push_str("Given:\n");
            for block in groups {
                fenced(&mut out, &block);
                out.push('\n');
            }
        }

        /* ---------- FOCAL ---------- */
        out.push_str("Write a Go test for:\n");
        fenced(&mut out, focal_source.trim_end());

        out.push_str(INSTRUCTIONS);
        out
    }
}

/// Synthetic `package` file holding every renderable definition of one
/// package; `None` when nothing in the group has a body.
fn package_block(pkg: &str, defs: &[&Definition]) -> Option<String> {
    let bodies: Vec<&str> = defs.iter().filter_map(|d| d.body()).collect();
    if bodies.is_empty() {
        return None;
    }
    let mut block = format!("package {pkg}\n");
    for body in bodies {
        block.push('\n');
        block.push_str(body.trim_end());
        block.push('\n');
    }
    Some(block.trim_end().to_string())
}

fn fenced(out: &mut String, body: &str) {
    out.push_str("```go\n");
    out.push_str(body);
    out.push_str("\n```\n");
}

/* ============================================================
   Conversation
   ============================================================ */

/// Initial prompt plus the append-only list of repair followups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    initial: String,
    followups: Vec<String>,
}

impl PromptContext {
    pub fn new(initial: String) -> Self {
        Self {
            initial,
            followups: Vec::new(),
        }
    }

    pub fn initial(&self) -> &str {
        &self.initial
    }

    pub fn followups(&self) -> &[String] {
        &self.followups
    }

    /// One followup per non-empty diagnostic in `result`; returns how many
    /// were appended.
    pub fn add_repair(&mut self, test: &str, result: &RunResult) -> usize {
        let before = self.followups.len();
        if let Some(diag) = result.compile_error().filter(|d| !d.trim().is_empty()) {
            self.followups
                .push(repair_prompt(test, "failed with the compile error:", diag));
        }
        if let Some(msg) = result.failure_message().filter(|m| !m.trim().is_empty()) {
            self.followups
                .push(repair_prompt(test, "failed with the message:", msg));
        }
        self.followups.len() - before
    }

    /// Followup for output that did not contain a usable test.
    pub fn add_malformed(&mut self, raw: &str, err: &ArtifactError) {
        let mut p = String::new();
        p.push_str("Your previous answer\n");
        fenced(&mut p, raw.trim());
        p.push_str("could not be used: ");
        p.push_str(&err.to_string());
        p.push_str("\nPlease answer with a single Go test function.\n");
        p.push_str(INSTRUCTIONS);
        self.followups.push(p);
    }

    pub fn to_request(&self) -> ChatRequest {
        let mut messages = vec![ChatMessage {
            role: Role::System,
            content: self.initial.clone(),
        }];
        messages.extend(self.followups.iter().map(|f| ChatMessage {
            role: Role::User,
            content: f.clone(),
        }));
        ChatRequest { messages }
    }
}

fn repair_prompt(test: &str, what: &str, diagnostic: &str) -> String {
    let mut p = String::new();
    p.push_str("The test you generated\n");
    fenced(&mut p, test.trim_end());
    p.push_str(what);
    p.push('\n');
    p.push_str("```\n");
    p.push_str(diagnostic.trim_end());
    p.push_str("\n```\n");
    p.push_str("Please fix the test.\n");
    p.push_str(INSTRUCTIONS);
    p
}
