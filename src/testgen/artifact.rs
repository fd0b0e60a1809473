// src/testgen/artifact.rs
//
// Turns raw generated text into one validated Go test.

use crate::error::ArtifactError;
use crate::source::parser::{parse_go, syntax_errors, text};

pub const TEST_PREFIX: &str = "Test";

const FENCE_OPENERS: [&str; 3] = ["```golang", "```go", "```"];
const FENCE: &str = "```";

/// A parsed test plus any helper declarations (fakes) that came with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTest {
    pub name: String,
    pub source: String,
}

pub fn strip_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    for opener in FENCE_OPENERS {
        if let Some(rest) = s.strip_prefix(opener) {
            s = rest;
        }
    }
    if let Some(rest) = s.strip_suffix(FENCE) {
        s = rest;
    }
    s.trim()
}

/// A leading `package` clause is dropped; the test file already has one.
fn strip_package_clause(s: &str) -> &str {
    if s.starts_with("package ") {
        s.split_once('\n').map(|(_, rest)| rest.trim_start()).unwrap_or("")
    } else {
        s
    }
}

/// `TestXxx` where `Xxx` does not start with a lower-case letter.
pub fn is_test_name(name: &str) -> bool {
    match name.strip_prefix(TEST_PREFIX) {
        Some(rest) => !rest.starts_with(|c: char| c.is_lowercase()),
        None => false,
    }
}

pub fn parse_artifact(raw: &str) -> Result<GeneratedTest, ArtifactError> {
    let source = strip_package_clause(strip_fences(raw));
    let wrapped = format!("package main\n{source}");
    let tree = parse_go(&wrapped).map_err(|e| ArtifactError::Syntax(e.to_string()))?;
    let root = tree.root_node();

    let errors = syntax_errors(root);
    if !errors.is_empty() {
        let listed: Vec<String> = errors
            .iter()
            .map(|(line, col, what)| format!("{}:{col}: {what}", line.saturating_sub(1)))
            .collect();
        return Err(ArtifactError::Syntax(listed.join(", ")));
    }

    let mut cursor = root.walk();
    let name = root
        .named_children(&mut cursor)
        .filter(|n| n.kind() == "function_declaration")
        .filter_map(|n| n.child_by_field_name("name"))
        .map(|n| text(n, &wrapped))
        .find(|name| is_test_name(name))
        .map(str::to_string);

    match name {
        Some(name) => Ok(GeneratedTest {
            name,
            source: source.to_string(),
        }),
        None => Err(ArtifactError::TestNotFound),
    }
}
