// src/source/package.rs
//
// One directory of Go files and the declaration lookups the resolver and the
// closure walk need. Lookups only consider non-test files, mirroring the
// package the compiler would build.

use std::path::{Path, PathBuf};

use tree_sitter::{Node, Tree};

use super::parser::{field_children, first_named, named_children, text};
use crate::model::{PackageRef, Receiver, ReceiverKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Explicit alias, if any (`foo "example.com/bar"`).
    pub alias: Option<String>,
    pub path: String,
}

impl Import {
    /// Best guess at the package name when the target is not loaded:
    /// last path segment, skipping a trailing major-version segment.
    pub fn default_name(&self) -> &str {
        let mut segments = self.path.rsplit('/');
        let last = segments.next().unwrap_or(&self.path);
        let is_major = last.len() > 1
            && last.starts_with('v')
            && last[1..].chars().all(|c| c.is_ascii_digit());
        if is_major {
            segments.next().unwrap_or(last)
        } else {
            last
        }
    }
}

pub struct GoFile {
    pub path: PathBuf,
    pub source: String,
    pub tree: Tree,
    pub package_name: String,
    pub imports: Vec<Import>,
}

impl GoFile {
    pub fn new(path: PathBuf, source: String, tree: Tree) -> Self {
        let root = tree.root_node();
        let package_name = package_clause(root, &source).unwrap_or_default();
        let imports = collect_imports(root, &source);
        Self {
            path,
            source,
            tree,
            package_name,
            imports,
        }
    }

    pub fn is_test(&self) -> bool {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with("_test.go"))
            .unwrap_or(false)
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        text(node, &self.source)
    }

    pub fn top_level(&self) -> Vec<Node<'_>> {
        named_children(self.root())
    }
}

fn package_clause(root: Node<'_>, source: &str) -> Option<String> {
    named_children(root)
        .into_iter()
        .find(|n| n.kind() == "package_clause")
        .and_then(|n| named_children(n).into_iter().next())
        .map(|n| text(n, source).to_string())
}

fn collect_imports(root: Node<'_>, source: &str) -> Vec<Import> {
    let mut out = Vec::new();
    for decl in named_children(root) {
        if decl.kind() != "import_declaration" {
            continue;
        }
        super::parser::walk(decl, &mut |n| {
            if n.kind() != "import_spec" {
                return;
            }
            let Some(path) = n.child_by_field_name("path") else {
                return;
            };
            let path = text(path, source).trim_matches(|c| c == '"' || c == '`');
            let alias = match n.child_by_field_name("name") {
                Some(name) if matches!(name.kind(), "dot" | "blank_identifier") => return,
                Some(name) => Some(text(name, source).to_string()),
                None => None,
            };
            out.push(Import {
                alias,
                path: path.to_string(),
            });
        });
    }
    out
}

/* ============================================================
   Declarations
   ============================================================ */

/// A declaration node together with the file it lives in.
#[derive(Clone, Copy)]
pub struct Decl<'a> {
    pub file: &'a GoFile,
    pub node: Node<'a>,
}

impl<'a> Decl<'a> {
    pub fn text(&self) -> &'a str {
        text(self.node, &self.file.source)
    }

    pub fn path(&self) -> &'a Path {
        &self.file.path
    }

    pub fn field(&self, name: &str) -> Option<Node<'a>> {
        self.node.child_by_field_name(name)
    }

    /// Same file, different node.
    pub fn at(&self, node: Node<'a>) -> Decl<'a> {
        Decl {
            file: self.file,
            node,
        }
    }

    /// Declaration text up to (not including) the body block.
    pub fn signature(&self) -> &'a str {
        match self.field("body") {
            Some(body) => self.file.source[self.node.start_byte()..body.start_byte()].trim_end(),
            None => self.text(),
        }
    }
}

/// `var`/`const` spec plus the position of the wanted name within it.
#[derive(Clone, Copy)]
pub struct ValueSpec<'a> {
    pub decl: Decl<'a>,
    pub index: usize,
}

pub struct Package {
    pub id: String,
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<GoFile>,
}

impl Package {
    pub fn reference(&self) -> PackageRef {
        PackageRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    pub fn source_files(&self) -> impl Iterator<Item = &GoFile> {
        self.files.iter().filter(|f| !f.is_test())
    }

    pub fn test_files(&self) -> impl Iterator<Item = &GoFile> {
        self.files.iter().filter(|f| f.is_test())
    }

    pub fn file(&self, path: &Path) -> Option<&GoFile> {
        self.files.iter().find(|f| f.path == path)
    }

    fn top_level(&self) -> impl Iterator<Item = Decl<'_>> {
        self.source_files().flat_map(|file| {
            file.top_level()
                .into_iter()
                .map(move |node| Decl { file, node })
        })
    }

    /// `type_spec` or `type_alias` named `name`.
    pub fn find_type(&self, name: &str) -> Option<Decl<'_>> {
        self.top_level()
            .filter(|d| d.node.kind() == "type_declaration")
            .flat_map(|d| {
                named_children(d.node)
                    .into_iter()
                    .map(move |spec| d.at(spec))
            })
            .find(|spec| {
                matches!(spec.node.kind(), "type_spec" | "type_alias")
                    && spec
                        .field("name")
                        .map(|n| spec.file.text(n) == name)
                        .unwrap_or(false)
            })
    }

    /// Plain function (no receiver) named `name`.
    pub fn find_func(&self, name: &str) -> Option<Decl<'_>> {
        self.top_level().find(|d| {
            d.node.kind() == "function_declaration"
                && d.field("name").map(|n| d.file.text(n) == name).unwrap_or(false)
        })
    }

    /// Method `name` declared on `recv_type`, whichever receiver kind it uses.
    pub fn find_method(&self, recv_type: &str, name: &str) -> Option<(Decl<'_>, Receiver)> {
        self.top_level()
            .filter(|d| d.node.kind() == "method_declaration")
            .filter(|d| d.field("name").map(|n| d.file.text(n) == name).unwrap_or(false))
            .find_map(|d| {
                let recv = method_receiver(d)?;
                (recv.type_name == recv_type).then_some((d, recv))
            })
    }

    /// Package-level `var` or `const` declaring `name`.
    pub fn find_value(&self, name: &str) -> Option<ValueSpec<'_>> {
        for d in self.top_level() {
            if !matches!(d.node.kind(), "var_declaration" | "const_declaration") {
                continue;
            }
            let mut found = None;
            super::parser::walk(d.node, &mut |n| {
                if found.is_some() || !matches!(n.kind(), "var_spec" | "const_spec") {
                    return;
                }
                if let Some(index) = field_children(n, "name")
                    .iter()
                    .position(|id| d.file.text(*id) == name)
                {
                    found = Some(ValueSpec {
                        decl: d.at(n),
                        index,
                    });
                }
            });
            if found.is_some() {
                return found;
            }
        }
        None
    }

    pub fn declares_type(&self, name: &str) -> bool {
        self.find_type(name).is_some()
    }
}

/// Receiver of a `method_declaration`: base type name and pointer-ness.
pub fn method_receiver(decl: Decl<'_>) -> Option<Receiver> {
    let params = decl.field("receiver")?;
    let first = named_children(params)
        .into_iter()
        .find(|n| n.kind() == "parameter_declaration")?;
    let ty = first.child_by_field_name("type")?;
    let (base, kind) = match ty.kind() {
        "pointer_type" => (first_named(ty)?, ReceiverKind::Pointer),
        _ => (ty, ReceiverKind::Value),
    };
    let base = match base.kind() {
        "generic_type" => base.child_by_field_name("type")?,
        _ => base,
    };
    Some(Receiver {
        type_name: decl.file.text(base).to_string(),
        kind,
    })
}

/// `true` when a type spec's underlying type is an interface.
pub fn is_interface(spec: Decl<'_>) -> bool {
    spec.field("type")
        .map(|t| t.kind() == "interface_type")
        .unwrap_or(false)
}

/// Interface method element named `name`, if `spec` is an interface.
pub fn interface_method<'a>(spec: Decl<'a>, name: &str) -> Option<Decl<'a>> {
    let iface = spec.field("type").filter(|t| t.kind() == "interface_type")?;
    named_children(iface)
        .into_iter()
        .filter(|n| matches!(n.kind(), "method_elem" | "method_spec"))
        .find(|n| {
            n.child_by_field_name("name")
                .map(|id| spec.file.text(id) == name)
                .unwrap_or(false)
        })
        .map(|n| spec.at(n))
}

fn field_declarations<'a>(spec: Decl<'a>) -> Vec<Node<'a>> {
    let Some(st) = spec.field("type").filter(|t| t.kind() == "struct_type") else {
        return Vec::new();
    };
    named_children(st)
        .into_iter()
        .filter(|n| n.kind() == "field_declaration_list")
        .flat_map(named_children)
        .filter(|n| n.kind() == "field_declaration")
        .collect()
}

/// Type nodes of a struct's embedded fields. `*T` embeds yield `T`.
pub fn embedded_fields<'a>(spec: Decl<'a>) -> Vec<Node<'a>> {
    field_declarations(spec)
        .into_iter()
        .filter(|f| field_children(*f, "name").is_empty())
        .filter_map(|f| f.child_by_field_name("type"))
        .collect()
}

/// Interfaces embedded in an interface spec (`interface{ Finder; Close() }`).
/// Union and approximation constraints are skipped.
pub fn embedded_interfaces<'a>(spec: Decl<'a>) -> Vec<Node<'a>> {
    let Some(iface) = spec.field("type").filter(|t| t.kind() == "interface_type") else {
        return Vec::new();
    };
    named_children(iface)
        .into_iter()
        .filter_map(|n| match n.kind() {
            "type_elem" | "constraint_elem" => match named_children(n).as_slice() {
                [only] => Some(*only),
                _ => None,
            },
            "interface_type_name" => first_named(n),
            "type_identifier" | "qualified_type" => Some(n),
            _ => None,
        })
        .filter(|n| matches!(n.kind(), "type_identifier" | "qualified_type" | "generic_type"))
        .collect()
}

/// Type node of struct field `name` declared directly on `spec`.
pub fn struct_field<'a>(spec: Decl<'a>, name: &str) -> Option<Node<'a>> {
    field_declarations(spec)
        .into_iter()
        .find_map(|field| {
            let ty = field.child_by_field_name("type")?;
            let names = field_children(field, "name");
            if names.is_empty() {
                // Embedded field: named after its type.
                let base = match ty.kind() {
                    "qualified_type" => ty.child_by_field_name("name")?,
                    "generic_type" => ty.child_by_field_name("type")?,
                    _ => ty,
                };
                return (spec.file.text(base) == name).then_some(ty);
            }
            names
                .iter()
                .any(|n| spec.file.text(*n) == name)
                .then_some(ty)
        })
}

/// Result type nodes of a function or method, flattened per declared name:
/// `(a, b int, err error)` yields `int, int, error`.
pub fn result_types<'a>(decl: Decl<'a>) -> Vec<Node<'a>> {
    let Some(result) = decl.field("result") else {
        return Vec::new();
    };
    if result.kind() != "parameter_list" {
        return vec![result];
    }
    let mut out = Vec::new();
    for param in named_children(result) {
        let Some(ty) = param.child_by_field_name("type") else {
            continue;
        };
        let n = field_children(param, "name").len().max(1);
        out.extend(std::iter::repeat(ty).take(n));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parser::parse_go;

    fn package(files: &[(&str, &str)]) -> Package {
        let files = files
            .iter()
            .map(|(path, src)| {
                let tree = parse_go(src).unwrap();
                GoFile::new(PathBuf::from(path), src.to_string(), tree)
            })
            .collect();
        Package {
            id: "example.com/shop".into(),
            name: "shop".into(),
            dir: PathBuf::from("/repo/shop"),
            files,
        }
    }

    const CART: &str = r#"package shop

import (
	"fmt"
	inv "example.com/shop/inventory"
	_ "embed"
)

type Cart struct {
	Items []Item
	Store inv.Store
}

type Pricer interface {
	Price(id string) (int, error)
}

var DefaultCart, OtherCart = NewCart(), NewCart()

func NewCart() *Cart { return &Cart{} }

func (c *Cart) Total() (sum int, err error) {
	fmt.Println("x")
	return 0, nil
}

func (c Cart) Len() int { return len(c.Items) }
"#;

    #[test]
    fn imports_keep_explicit_aliases_and_skip_blank() {
        let pkg = package(&[("/repo/shop/cart.go", CART)]);
        let f = &pkg.files[0];
        assert_eq!(f.package_name, "shop");
        assert_eq!(
            f.imports,
            vec![
                Import {
                    alias: None,
                    path: "fmt".into()
                },
                Import {
                    alias: Some("inv".into()),
                    path: "example.com/shop/inventory".into()
                },
            ]
        );
    }

    #[test]
    fn default_import_name_skips_major_version() {
        let imp = Import {
            alias: None,
            path: "github.com/acme/widgets/v2".into(),
        };
        assert_eq!(imp.default_name(), "widgets");
    }

    #[test]
    fn finds_methods_with_their_receiver_kind() {
        let pkg = package(&[("/repo/shop/cart.go", CART)]);
        let (_, recv) = pkg.find_method("Cart", "Total").unwrap();
        assert_eq!(recv.kind, ReceiverKind::Pointer);
        let (decl, recv) = pkg.find_method("Cart", "Len").unwrap();
        assert_eq!(recv.kind, ReceiverKind::Value);
        assert_eq!(decl.signature(), "func (c Cart) Len() int");
        assert!(pkg.find_method("Pricer", "Len").is_none());
    }

    #[test]
    fn type_lookups_classify_interfaces_and_fields() {
        let pkg = package(&[("/repo/shop/cart.go", CART)]);
        let pricer = pkg.find_type("Pricer").unwrap();
        assert!(is_interface(pricer));
        assert!(interface_method(pricer, "Price").is_some());

        let cart = pkg.find_type("Cart").unwrap();
        assert!(!is_interface(cart));
        let store = struct_field(cart, "Store").unwrap();
        assert_eq!(cart.file.text(store), "inv.Store");
    }

    #[test]
    fn value_specs_and_result_types() {
        let pkg = package(&[("/repo/shop/cart.go", CART)]);
        let other = pkg.find_value("OtherCart").unwrap();
        assert_eq!(other.index, 1);

        let (total, _) = pkg.find_method("Cart", "Total").unwrap();
        let results: Vec<_> = result_types(total)
            .into_iter()
            .map(|n| total.file.text(n))
            .collect();
        assert_eq!(results, vec!["int", "error"]);
    }

    #[test]
    fn test_files_are_not_searched() {
        let pkg = package(&[
            ("/repo/shop/cart.go", CART),
            (
                "/repo/shop/cart_test.go",
                "package shop\n\ntype fakeStore struct{}\n",
            ),
        ]);
        assert!(pkg.find_type("fakeStore").is_none());
        assert_eq!(pkg.test_files().count(), 1);
    }

    #[test]
    fn embedded_fields_and_interfaces_are_listed_by_type() {
        let src = "package shop\n\ntype Base struct{}\n\ntype Order struct {\n\t*Base\n\tinv.Store\n\tID string\n}\n\ntype Reader interface {\n\tio.Reader\n\tCloser\n\tRead() error\n\t~int | ~string\n}\n";
        let pkg = package(&[("/repo/shop/order.go", src)]);
        let order = pkg.find_type("Order").unwrap();
        let texts = |nodes: Vec<Node<'_>>| {
            nodes
                .into_iter()
                .map(|n| order.file.text(n).to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(texts(embedded_fields(order)), vec!["Base", "inv.Store"]);
        assert!(struct_field(order, "Base").is_some());
        assert!(struct_field(order, "Store").is_some());

        let reader = pkg.find_type("Reader").unwrap();
        assert_eq!(texts(embedded_interfaces(reader)), vec!["io.Reader", "Closer"]);
        assert!(interface_method(reader, "Read").is_some());
        assert!(embedded_interfaces(order).is_empty());
        assert!(embedded_fields(reader).is_empty());
    }
}
