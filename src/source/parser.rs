//! source/parser.rs
//!
//! Go parsing on a thread-local tree-sitter parser, plus small node helpers
//! shared by the resolver, the closure walk and the patcher.

use std::cell::RefCell;

use tree_sitter::{Node, Parser, Tree};

use crate::error::LoadError;

thread_local! {
    static GO_PARSER: RefCell<Option<Parser>> = RefCell::new(make_go_parser());
}

fn make_go_parser() -> Option<Parser> {
    let mut p = Parser::new();
    p.set_language(&tree_sitter_go::LANGUAGE.into()).ok()?;
    Some(p)
}

pub fn parse_go(source: &str) -> Result<Tree, LoadError> {
    GO_PARSER.with(|cell| {
        let mut guard = cell.borrow_mut();
        let parser = guard
            .as_mut()
            .ok_or_else(|| LoadError::Grammar("tree-sitter-go failed to load".into()))?;
        parser
            .parse(source, None)
            .ok_or_else(|| LoadError::Grammar("parser returned no tree".into()))
    })
}

pub fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

/// `line:column` (1-based) of every ERROR or MISSING node below `root`.
pub fn syntax_errors(root: Node<'_>) -> Vec<(usize, usize, &'static str)> {
    let mut out = Vec::new();
    if root.has_error() {
        collect_errors(root, &mut out);
    }
    out
}

fn collect_errors(node: Node<'_>, out: &mut Vec<(usize, usize, &'static str)>) {
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        let what = if node.is_missing() {
            "missing token"
        } else {
            "syntax error"
        };
        out.push((pos.row + 1, pos.column + 1, what));
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_errors(child, out);
    }
}

/// Pre-order walk over `node` and all of its descendants.
pub fn walk<'a>(node: Node<'a>, f: &mut impl FnMut(Node<'a>)) {
    f(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, f);
    }
}

/// All `name` field children (parameter and field declarations may declare
/// several names in one node).
pub fn field_children<'a>(node: Node<'a>, field: &str) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    let out = node.children_by_field_name(field, &mut cursor).collect();
    out
}

pub fn named_children<'a>(node: Node<'a>) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    let out = node.named_children(&mut cursor).collect();
    out
}

pub fn first_named(node: Node<'_>) -> Option<Node<'_>> {
    named_children(node).into_iter().next()
}
