// src/testgen/patch.rs
//
// Merges a generated test into its `_test.go` file.
//
// Guarantees:
// - One write per save; counts reflect the file as the import fixer left it
// - Only the previous version of the test and the declarations the new
//   artifact redeclares are removed
// - Saving the same test twice leaves the file byte-identical
//
// Not safe for concurrent writers on the same file; callers serialize runs.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use similar::{ChangeTag, TextDiff};
use tree_sitter::Node;

use crate::error::PatchError;
use crate::source::parser::{field_children, first_named, named_children, parse_go, syntax_errors, text};
use crate::testgen::artifact::GeneratedTest;

/* ============================================================
   Import normalization
   ============================================================ */

/// External pass run over the whole file after writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportFixer {
    Command { program: String, args: Vec<String> },
    Disabled,
}

impl ImportFixer {
    pub fn goimports() -> Self {
        Self::command("goimports", ["-w"])
    }

    pub fn command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ImportFixer::Command {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn disabled() -> Self {
        ImportFixer::Disabled
    }

    fn run(&self, path: &Path) -> Result<(), PatchError> {
        let ImportFixer::Command { program, args } = self else {
            return Ok(());
        };
        let output = Command::new(program)
            .args(args)
            .arg(path)
            .output()
            .map_err(|source| PatchError::ImportsSpawn {
                program: program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(PatchError::Imports {
                program: program.clone(),
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/* ============================================================
   Patcher
   ============================================================ */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSummary {
    pub path: PathBuf,
    pub created: bool,
    pub added: usize,
    pub removed: usize,
}

pub struct TestFilePatcher {
    imports: ImportFixer,
}

impl TestFilePatcher {
    pub fn new(imports: ImportFixer) -> Self {
        Self { imports }
    }

    pub fn save(
        &self,
        path: &Path,
        package_name: &str,
        test: &GeneratedTest,
    ) -> Result<PatchSummary, PatchError> {
        let io_err = |source: io::Error| PatchError::Io {
            path: path.to_path_buf(),
            source,
        };

        let (existing, created) = match fs::read_to_string(path) {
            Ok(s) => (s, false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (String::new(), true),
            Err(e) => return Err(io_err(e)),
        };

        let updated = patch_content(&existing, package_name, test);
        fs::write(path, &updated).map_err(io_err)?;
        self.imports.run(path)?;
        let written = match self.imports {
            ImportFixer::Command { .. } => fs::read_to_string(path).map_err(io_err)?,
            ImportFixer::Disabled => updated,
        };

        let (added, removed) = line_changes(&existing, &written);
        tracing::debug!(path = %path.display(), added, removed, "test file patched");
        Ok(PatchSummary {
            path: path.to_path_buf(),
            created,
            added,
            removed,
        })
    }
}

/// New file content: `existing` minus stale declarations, then the test.
pub fn patch_content(existing: &str, package_name: &str, test: &GeneratedTest) -> String {
    let base = remove_stale(existing, test);
    let mut out = if base.trim().is_empty() {
        format!("package {package_name}\n\n")
    } else {
        format!("{}\n\n", base.trim_end())
    };
    out.push_str(test.source.trim());
    out.push('\n');
    out
}

fn remove_stale(existing: &str, test: &GeneratedTest) -> String {
    if existing.trim().is_empty() {
        return String::new();
    }
    match parse_go(existing) {
        Ok(tree) if syntax_errors(tree.root_node()).is_empty() => {
            let declared = DeclaredNames::of_artifact(test);
            let spans = stale_spans(tree.root_node(), existing, &declared);
            cut(existing, &spans)
        }
        _ => remove_by_braces(existing, &test.name),
    }
}

fn line_changes(old: &str, new: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .fold((0, 0), |(add, del), c| match c.tag() {
            ChangeTag::Insert => (add + 1, del),
            ChangeTag::Delete => (add, del + 1),
            ChangeTag::Equal => (add, del),
        })
}

/* ============================================================
   Syntax-tree removal
   ============================================================ */

/// Top-level names the artifact declares; methods keyed by receiver type.
#[derive(Debug, Default)]
struct DeclaredNames {
    test: String,
    names: HashSet<String>,
    methods: HashSet<(String, String)>,
}

impl DeclaredNames {
    fn of_artifact(test: &GeneratedTest) -> Self {
        let mut out = Self {
            test: test.name.clone(),
            ..Self::default()
        };
        out.names.insert(test.name.clone());

        let wrapped = format!("package main\n{}", test.source);
        let Ok(tree) = parse_go(&wrapped) else {
            return out;
        };
        for decl in named_children(tree.root_node()) {
            if decl.kind() == "method_declaration" {
                if let Some(key) = method_key(decl, &wrapped) {
                    out.methods.insert(key);
                }
            } else {
                out.names.extend(declared_names(decl, &wrapped));
            }
        }
        out
    }
}

fn declared_names(decl: Node<'_>, src: &str) -> Vec<String> {
    match decl.kind() {
        "function_declaration" => decl
            .child_by_field_name("name")
            .map(|n| vec![text(n, src).to_string()])
            .unwrap_or_default(),
        "type_declaration" | "var_declaration" | "const_declaration" => specs(decl)
            .into_iter()
            .flat_map(|spec| field_children(spec, "name"))
            .map(|n| text(n, src).to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Specs of a `type`/`var`/`const` declaration, grouped or not.
fn specs(decl: Node<'_>) -> Vec<Node<'_>> {
    named_children(decl)
        .into_iter()
        .flat_map(|n| match n.kind() {
            "var_spec_list" | "const_spec_list" => named_children(n),
            _ => vec![n],
        })
        .filter(|n| {
            matches!(
                n.kind(),
                "type_spec" | "type_alias" | "var_spec" | "const_spec"
            )
        })
        .collect()
}

fn method_key(decl: Node<'_>, src: &str) -> Option<(String, String)> {
    let name = text(decl.child_by_field_name("name")?, src).to_string();
    let param = named_children(decl.child_by_field_name("receiver")?)
        .into_iter()
        .find(|n| n.kind() == "parameter_declaration")?;
    let mut ty = param.child_by_field_name("type")?;
    if ty.kind() == "pointer_type" {
        ty = first_named(ty)?;
    }
    if ty.kind() == "generic_type" {
        ty = ty.child_by_field_name("type")?;
    }
    Some((text(ty, src).to_string(), name))
}

/// Byte ranges of top-level declarations to drop, each widened to whole
/// lines and to the comment lines directly above it.
fn stale_spans(root: Node<'_>, src: &str, declared: &DeclaredNames) -> Vec<(usize, usize)> {
    let top = named_children(root);
    let mut spans = Vec::new();
    for (i, decl) in top.iter().enumerate() {
        let stale = match decl.kind() {
            "method_declaration" => method_key(*decl, src)
                .map(|k| declared.methods.contains(&k))
                .unwrap_or(false),
            "type_declaration" | "var_declaration" | "const_declaration" => {
                // Grouped declarations holding other names stay.
                specs(*decl).len() == 1
                    && declared_names(*decl, src)
                        .iter()
                        .any(|n| declared.names.contains(n))
            }
            // A same-named function is only the old test if it takes `*testing.T`.
            "function_declaration" => declared_names(*decl, src).iter().any(|n| {
                declared.names.contains(n) && (*n != declared.test || takes_testing_t(*decl, src))
            }),
            _ => false,
        };
        if !stale {
            continue;
        }

        let mut start = *decl;
        for prev in top[..i].iter().rev() {
            if prev.kind() != "comment" || prev.end_position().row + 1 != start.start_position().row {
                break;
            }
            start = *prev;
        }
        let mut end = line_end(src, decl.end_byte());
        // Take one separating blank line along.
        if src[end..].starts_with('\n') {
            end += 1;
        }
        spans.push((line_start(src, start.start_byte()), end));
    }
    spans
}

/// `func F(t *testing.T)`: exactly one parameter, of type `*testing.T`.
fn takes_testing_t(func: Node<'_>, src: &str) -> bool {
    let Some(params) = func.child_by_field_name("parameters") else {
        return false;
    };
    let params = named_children(params);
    let [param] = params.as_slice() else {
        return false;
    };
    if param.kind() != "parameter_declaration" || field_children(*param, "name").len() > 1 {
        return false;
    }
    param
        .child_by_field_name("type")
        .filter(|ty| ty.kind() == "pointer_type")
        .and_then(first_named)
        .is_some_and(|inner| inner.kind() == "qualified_type" && text(inner, src) == "testing.T")
}

fn line_start(src: &str, at: usize) -> usize {
    src[..at].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn line_end(src: &str, at: usize) -> usize {
    src[at..].find('\n').map(|i| at + i + 1).unwrap_or(src.len())
}

fn cut(src: &str, spans: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(src.len());
    let mut pos = 0;
    for &(start, end) in spans {
        if start < pos {
            pos = pos.max(end);
            continue;
        }
        out.push_str(&src[pos..start]);
        pos = end;
    }
    out.push_str(&src[pos..]);
    out
}

/* ============================================================
   Line-oriented fallback
   ============================================================ */

fn test_header(name: &str, line: &str) -> bool {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = HEADER
        .get_or_init(|| Regex::new(r"^func\s+(\w+)\s*\(\s*\w+\s+\*testing\.T\s*\)").ok())
        .as_ref()
    else {
        return false;
    };
    re.captures(line)
        .and_then(|c| c.get(1))
        .is_some_and(|m| m.as_str() == name)
}

/// Drops the test's lines from its header until braces balance again.
/// Braces inside strings or comments are counted too.
fn remove_by_braces(src: &str, name: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut depth: i64 = 0;
    let mut inside = false;
    let mut opened = false;

    for line in src.split_inclusive('\n') {
        if !inside && test_header(name, line) {
            inside = true;
            depth = 0;
            opened = false;
        }
        if !inside {
            out.push_str(line);
            continue;
        }
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            inside = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test(name: &str, source: &str) -> GeneratedTest {
        GeneratedTest {
            name: name.into(),
            source: source.into(),
        }
    }

    const NEW_T: &str = "func TestAdd(t *testing.T) {\n\tif Add(1, 2) != 3 {\n\t\tt.Fatal(\"new\")\n\t}\n}";

    const EXISTING: &str = r#"package calc

import "testing"

func TestA(t *testing.T) {}

// TestAdd checks addition.
// Old version.
func TestAdd(t *testing.T) {
	if Add(1, 1) != 2 {
		t.Fatal("old")
	}
}

func TestB(t *testing.T) {
	s := "}"
	_ = s
}
"#;

    #[test]
    fn empty_file_gets_a_package_clause() {
        let out = patch_content("", "calc", &test("TestAdd", NEW_T));
        assert_eq!(out, format!("package calc\n\n{NEW_T}\n"));
    }

    #[test]
    fn replaces_old_version_and_keeps_neighbours() {
        let out = patch_content(EXISTING, "calc", &test("TestAdd", NEW_T));
        assert!(out.contains("func TestA(t *testing.T) {}"));
        assert!(out.contains("func TestB(t *testing.T) {\n\ts := \"}\""));
        assert_eq!(out.matches("func TestAdd(").count(), 1);
        assert!(out.contains("t.Fatal(\"new\")"));
        assert!(!out.contains("Old version"));
        assert!(out.ends_with(&format!("{NEW_T}\n")));
    }

    #[test]
    fn saving_twice_is_idempotent() {
        let t = test("TestAdd", NEW_T);
        let once = patch_content(EXISTING, "calc", &t);
        let twice = patch_content(&once, "calc", &t);
        assert_eq!(once, twice);

        let fresh = patch_content("", "calc", &t);
        assert_eq!(patch_content(&fresh, "calc", &t), fresh);
    }

    #[test]
    fn redeclared_fakes_are_replaced_but_groups_stay() {
        let existing = "package shop\n\ntype fakeRepo struct{ n int }\n\nfunc (f *fakeRepo) Find() int { return f.n }\n\ntype (\n\tkeep struct{}\n\tfakeClock struct{}\n)\n\nfunc TestOld(t *testing.T) {}\n";
        let source = "type fakeRepo struct{}\n\nfunc (f *fakeRepo) Find() int { return 1 }\n\ntype fakeClock struct{}\n\nfunc TestNew(t *testing.T) {}";
        let out = patch_content(existing, "shop", &test("TestNew", source));
        assert_eq!(out.matches("type fakeRepo struct").count(), 1);
        assert_eq!(out.matches("Find() int").count(), 1);
        assert!(out.contains("keep struct{}"));
        assert!(out.contains("func TestOld(t *testing.T) {}"));
    }

    #[test]
    fn unparsable_file_falls_back_to_brace_counting() {
        let broken = "package calc\n\nfunc TestAdd(t *testing.T) {\n\tif x {\n\t}\n}\n\nfunc Broken( {\n";
        let out = remove_by_braces(broken, "TestAdd");
        assert_eq!(out, "package calc\n\n\nfunc Broken( {\n");

        let patched = patch_content(broken, "calc", &test("TestAdd", NEW_T));
        assert_eq!(patched.matches("func TestAdd(").count(), 1);
        assert!(patched.contains("func Broken( {"));
    }

    #[test]
    fn header_match_is_exact() {
        assert!(test_header("TestAdd", "func TestAdd(t *testing.T) {"));
        assert!(!test_header("TestAdd", "func TestAddMore(t *testing.T) {"));
        assert!(!test_header("TestAdd", "func TestAdd() {"));
    }

    #[test]
    fn save_creates_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calc_test.go");
        let patcher = TestFilePatcher::new(ImportFixer::disabled());
        let t = test("TestAdd", NEW_T);

        let first = patcher.save(&path, "calc", &t).unwrap();
        assert!(first.created);
        assert_eq!(first.removed, 0);
        let written = fs::read_to_string(&path).unwrap();

        let second = patcher.save(&path, "calc", &t).unwrap();
        assert!(!second.created);
        assert_eq!((second.added, second.removed), (0, 0));
        assert_eq!(fs::read_to_string(&path).unwrap(), written);
    }

    #[test]
    fn failing_import_tool_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calc_test.go");
        let patcher = TestFilePatcher::new(ImportFixer::command("gotestgen-no-such-tool", ["-w"]));
        assert!(matches!(
            patcher.save(&path, "calc", &test("TestAdd", NEW_T)),
            Err(PatchError::ImportsSpawn { .. })
        ));
    }

    #[test]
    fn same_named_non_test_function_is_kept() {
        let existing = "package calc\n\nimport \"testing\"\n\nfunc TestAdd(b *testing.B) {}\n\nfunc TestSum(t *testing.T, n int) {}\n";
        let out = patch_content(existing, "calc", &test("TestAdd", NEW_T));
        assert!(out.contains("func TestAdd(b *testing.B) {}"));
        assert!(out.contains("t.Fatal(\"new\")"));

        let out = patch_content(existing, "calc", &test("TestSum", "func TestSum(t *testing.T) {}"));
        assert!(out.contains("func TestSum(t *testing.T, n int) {}"));
    }

    #[test]
    #[cfg(unix)]
    fn counts_include_import_fixer_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calc_test.go");
        let fixer = ImportFixer::command("sh", ["-c", "printf '// fixed\\n' >> \"$0\""]);
        let patcher = TestFilePatcher::new(fixer);

        let summary = patcher.save(&path, "calc", &test("TestAdd", NEW_T)).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.ends_with("// fixed\n"));
        assert_eq!(summary.added, written.lines().count());
        assert_eq!(summary.removed, 0);
    }
}
