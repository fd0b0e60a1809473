//! source/binder.rs
//!
//! Bounded stand-in for a type checker. Knows the static type of an
//! expression only when it can be read off declarations: declared parameter
//! and variable types, composite literals, `&x`, calls with declared results,
//! struct field selections, package-level variables and the elements of
//! slices, arrays and maps. Anything else is unknown and callers skip it.
//!
//! Scopes are flattened per function: a later declaration of the same name
//! replaces the earlier one.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use super::package::{
    embedded_fields, embedded_interfaces, interface_method, is_interface, result_types,
    struct_field, Decl, GoFile, Package, ValueSpec,
};
use super::parser::{field_children, first_named, named_children, walk};
use super::SourceModel;
use crate::model::Receiver;

/// Hops across declarations allowed while inferring one expression.
const INFER_BUDGET: u8 = 8;

/// Named types followed while looking for a collection underneath.
const NAMED_HOPS: u8 = 2;

/// A named type declared somewhere in the module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub package: String,
    pub name: String,
    pub pointer: bool,
}

/// What ranging over or indexing a slice, array or map yields. `key` is
/// `None` for integer-indexed collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Elements {
    pub key: Option<TypeRef>,
    pub elem: Option<TypeRef>,
}

/// A method found on a type, directly or through embedding.
#[derive(Clone)]
pub enum Method<'a> {
    /// `receiver` is the type that declares the method, which may be an
    /// embedded field of the type the call went through.
    Concrete {
        package: &'a Package,
        decl: Decl<'a>,
        receiver: Receiver,
    },
    /// `spec` is the interface that declares the method, which may be one
    /// embedded in the interface the call went through.
    Interface {
        package: &'a Package,
        spec: Decl<'a>,
        decl: Decl<'a>,
    },
}

impl<'a> Method<'a> {
    pub fn decl(&self) -> Decl<'a> {
        match self {
            Method::Concrete { decl, .. } | Method::Interface { decl, .. } => *decl,
        }
    }
}

/// Where a node lives. Type names and import aliases only mean something
/// relative to a package and a file.
#[derive(Clone, Copy)]
pub struct Ctx<'a> {
    pub model: &'a SourceModel,
    pub package: &'a Package,
    pub file: &'a GoFile,
}

impl<'a> Ctx<'a> {
    pub fn of(model: &'a SourceModel, file: &'a GoFile) -> Option<Ctx<'a>> {
        let package = model.package_containing(file)?;
        Some(Ctx {
            model,
            package,
            file,
        })
    }

    pub fn text(&self, node: Node<'_>) -> &'a str {
        super::parser::text(node, &self.file.source)
    }

    /// Named module type a type expression denotes.
    pub fn resolve_type(&self, node: Node<'a>) -> Option<TypeRef> {
        match node.kind() {
            "type_identifier" => {
                let name = self.text(node);
                self.package.declares_type(name).then(|| TypeRef {
                    package: self.package.id.clone(),
                    name: name.to_string(),
                    pointer: false,
                })
            }
            "qualified_type" => {
                let alias = self.text(node.child_by_field_name("package")?);
                let name = self.text(node.child_by_field_name("name")?);
                let pkg = self.model.imported(self.file, alias)?;
                pkg.declares_type(name).then(|| TypeRef {
                    package: pkg.id.clone(),
                    name: name.to_string(),
                    pointer: false,
                })
            }
            "pointer_type" => {
                let inner = self.resolve_type(first_named(node)?)?;
                Some(TypeRef {
                    pointer: true,
                    ..inner
                })
            }
            "generic_type" => self.resolve_type(node.child_by_field_name("type")?),
            "parenthesized_type" => self.resolve_type(first_named(node)?),
            _ => None,
        }
    }

    /// Key and element types of a collection type expression. Looks through
    /// a pointer (`*[4]T`) and through named types defined as collections
    /// (`type Lines []Line`).
    pub fn elements(&self, node: Node<'a>) -> Option<Elements> {
        self.elements_within(node, NAMED_HOPS)
    }

    fn elements_within(&self, node: Node<'a>, hops: u8) -> Option<Elements> {
        match node.kind() {
            "slice_type" | "array_type" | "implicit_length_array_type" => Some(Elements {
                key: None,
                elem: node
                    .child_by_field_name("element")
                    .and_then(|t| self.resolve_type(t)),
            }),
            "map_type" => Some(Elements {
                key: node
                    .child_by_field_name("key")
                    .and_then(|t| self.resolve_type(t)),
                elem: node
                    .child_by_field_name("value")
                    .and_then(|t| self.resolve_type(t)),
            }),
            "pointer_type" | "parenthesized_type" => self.elements_within(first_named(node)?, hops),
            "type_identifier" | "qualified_type" | "generic_type" => {
                let ty = self.resolve_type(node)?;
                self.named_elements(&ty, hops)
            }
            _ => None,
        }
    }

    fn named_elements(&self, ty: &TypeRef, hops: u8) -> Option<Elements> {
        let hops = hops.checked_sub(1)?;
        let (_, spec) = self.type_decl(ty)?;
        let underlying = spec.field("type")?;
        Ctx::of(self.model, spec.file)?.elements_within(underlying, hops)
    }

    /// Declaring package and `type_spec` of a resolved type.
    pub fn type_decl(&self, ty: &TypeRef) -> Option<(&'a Package, Decl<'a>)> {
        let pkg = self.model.package(&ty.package)?;
        Some((pkg, pkg.find_type(&ty.name)?))
    }

    /// Method `name` of `owner`: declared on it, promoted from an embedded
    /// field, or inherited from an embedded interface.
    pub fn method(&self, owner: &TypeRef, name: &str) -> Option<Method<'a>> {
        self.method_in(owner, name, &mut HashSet::new())
    }

    fn method_in(
        &self,
        owner: &TypeRef,
        name: &str,
        seen: &mut HashSet<(String, String)>,
    ) -> Option<Method<'a>> {
        if !seen.insert((owner.package.clone(), owner.name.clone())) {
            return None;
        }
        let (package, spec) = self.type_decl(owner)?;
        let embedded = if is_interface(spec) {
            if let Some(decl) = interface_method(spec, name) {
                return Some(Method::Interface {
                    package,
                    spec,
                    decl,
                });
            }
            embedded_interfaces(spec)
        } else {
            if let Some((decl, receiver)) = package.find_method(&owner.name, name) {
                return Some(Method::Concrete {
                    package,
                    decl,
                    receiver,
                });
            }
            embedded_fields(spec)
        };
        let spec_ctx = Ctx::of(self.model, spec.file)?;
        embedded
            .into_iter()
            .filter_map(|ty| spec_ctx.resolve_type(ty))
            .find_map(|inner| spec_ctx.method_in(&inner, name, seen))
    }

    /// Type node of field `name` of `owner`, declared directly or promoted
    /// from an embedded struct, with the context it must be resolved in.
    pub fn field(&self, owner: &TypeRef, name: &str) -> Option<(Ctx<'a>, Node<'a>)> {
        self.field_in(owner, name, &mut HashSet::new())
    }

    fn field_in(
        &self,
        owner: &TypeRef,
        name: &str,
        seen: &mut HashSet<(String, String)>,
    ) -> Option<(Ctx<'a>, Node<'a>)> {
        if !seen.insert((owner.package.clone(), owner.name.clone())) {
            return None;
        }
        let (_, spec) = self.type_decl(owner)?;
        let spec_ctx = Ctx::of(self.model, spec.file)?;
        if let Some(ty) = struct_field(spec, name) {
            return Some((spec_ctx, ty));
        }
        embedded_fields(spec)
            .into_iter()
            .filter_map(|ty| spec_ctx.resolve_type(ty))
            .find_map(|inner| spec_ctx.field_in(&inner, name, seen))
    }
}

#[derive(Debug, Clone, Default)]
struct Local {
    ty: Option<TypeRef>,
    elems: Option<Elements>,
}

/// Local names visible in one function body and what is known about them.
pub struct Scope<'a> {
    ctx: Ctx<'a>,
    locals: HashMap<String, Local>,
}

impl<'a> Scope<'a> {
    /// Package-level scope: no locals.
    pub fn package(ctx: Ctx<'a>) -> Self {
        Self {
            ctx,
            locals: HashMap::new(),
        }
    }

    /// Scope of a function or method declaration (or function literal).
    pub fn function(ctx: Ctx<'a>, func: Node<'a>) -> Self {
        let mut scope = Self::package(ctx);
        for field in ["receiver", "parameters", "result"] {
            if let Some(list) = func.child_by_field_name(field) {
                if list.kind() == "parameter_list" {
                    scope.declare_params(list);
                }
            }
        }
        if let Some(body) = func.child_by_field_name("body") {
            let mut decls = Vec::new();
            walk(body, &mut |n| {
                if matches!(
                    n.kind(),
                    "short_var_declaration"
                        | "var_spec"
                        | "const_spec"
                        | "range_clause"
                        | "func_literal"
                        | "type_switch_statement"
                ) {
                    decls.push(n);
                }
            });
            for n in decls {
                scope.declare(n);
            }
        }
        scope
    }

    pub fn ctx(&self) -> Ctx<'a> {
        self.ctx
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    pub fn local_type(&self, name: &str) -> Option<&TypeRef> {
        self.locals.get(name).and_then(|l| l.ty.as_ref())
    }

    fn insert(&mut self, name: &str, local: Local) {
        if name != "_" {
            self.locals.insert(name.to_string(), local);
        }
    }

    fn declare_params(&mut self, list: Node<'a>) {
        for param in named_children(list) {
            let declared = param.child_by_field_name("type");
            let local = match (param.kind(), declared) {
                ("parameter_declaration", Some(t)) => Local {
                    ty: self.ctx.resolve_type(t),
                    elems: self.ctx.elements(t),
                },
                // `xs ...T` is a `[]T` inside the body.
                ("variadic_parameter_declaration", Some(t)) => Local {
                    ty: None,
                    elems: Some(Elements {
                        key: None,
                        elem: self.ctx.resolve_type(t),
                    }),
                },
                _ => Local::default(),
            };
            for name in field_children(param, "name") {
                let name = self.ctx.text(name);
                self.insert(name, local.clone());
            }
        }
    }

    fn declare(&mut self, n: Node<'a>) {
        match n.kind() {
            "short_var_declaration" => {
                let left = n.child_by_field_name("left").map(named_children).unwrap_or_default();
                let right = n.child_by_field_name("right").map(named_children).unwrap_or_default();
                let locals = self.assigned(&right, left.len());
                for (i, id) in left.iter().enumerate() {
                    if id.kind() == "identifier" {
                        let name = self.ctx.text(*id);
                        self.insert(name, locals.get(i).cloned().unwrap_or_default());
                    }
                }
            }
            "var_spec" | "const_spec" => {
                let names = field_children(n, "name");
                let locals = match (n.child_by_field_name("type"), n.child_by_field_name("value")) {
                    (Some(t), _) => {
                        let declared = Local {
                            ty: self.ctx.resolve_type(t),
                            elems: self.ctx.elements(t),
                        };
                        vec![declared; names.len()]
                    }
                    (None, Some(values)) => self.assigned(&named_children(values), names.len()),
                    (None, None) => Vec::new(),
                };
                for (i, id) in names.iter().enumerate() {
                    let name = self.ctx.text(*id);
                    self.insert(name, locals.get(i).cloned().unwrap_or_default());
                }
            }
            "range_clause" => {
                let mut cursor = n.walk();
                let declares = n.children(&mut cursor).any(|c| c.kind() == ":=");
                if !declares {
                    return;
                }
                let Some(left) = n.child_by_field_name("left") else {
                    return;
                };
                let ranged = n
                    .child_by_field_name("right")
                    .and_then(|r| self.infer_elements(r))
                    .unwrap_or_default();
                for (i, id) in named_children(left).into_iter().enumerate() {
                    let ty = match i {
                        0 => ranged.key.clone(),
                        1 => ranged.elem.clone(),
                        _ => None,
                    };
                    let name = self.ctx.text(id);
                    self.insert(name, Local { ty, elems: None });
                }
            }
            "func_literal" => {
                if let Some(params) = n.child_by_field_name("parameters") {
                    self.declare_params(params);
                }
            }
            "type_switch_statement" => {
                let Some(alias) = n.child_by_field_name("alias") else {
                    return;
                };
                let ids = match alias.kind() {
                    "identifier" => vec![alias],
                    _ => named_children(alias),
                };
                for id in ids {
                    let name = self.ctx.text(id);
                    self.insert(name, Local::default());
                }
            }
            _ => {}
        }
    }

    /// What is known about `count` targets assigned from `values`: one per
    /// value, or the declared results of a single multi-value call.
    fn assigned(&self, values: &[Node<'a>], count: usize) -> Vec<Local> {
        if values.len() == count {
            return values
                .iter()
                .map(|v| Local {
                    ty: self.infer(*v),
                    elems: self.infer_elements(*v),
                })
                .collect();
        }
        match values {
            [single] if single.kind() == "call_expression" => {
                let types = self.call_results(*single, INFER_BUDGET);
                (0..count)
                    .map(|i| Local {
                        ty: types.get(i).cloned().flatten(),
                        elems: self.call_elements(*single, i, INFER_BUDGET),
                    })
                    .collect()
            }
            // Comma-ok forms: `v, ok := m[k]` and `v, ok := x.(T)`.
            [single] if matches!(single.kind(), "index_expression" | "type_assertion_expression") => {
                vec![Local {
                    ty: self.infer(*single),
                    elems: self.infer_elements(*single),
                }]
            }
            _ => Vec::new(),
        }
    }

    /// Static type of an expression, when it can be read off declarations.
    pub fn infer(&self, expr: Node<'a>) -> Option<TypeRef> {
        self.infer_within(expr, INFER_BUDGET)
    }

    fn infer_within(&self, expr: Node<'a>, budget: u8) -> Option<TypeRef> {
        let budget = budget.checked_sub(1)?;
        match expr.kind() {
            "identifier" => {
                let name = self.ctx.text(expr);
                if let Some(local) = self.locals.get(name) {
                    return local.ty.clone();
                }
                let spec = self.ctx.package.find_value(name)?;
                value_type(self.ctx, spec, budget)
            }
            "composite_literal" => self.ctx.resolve_type(expr.child_by_field_name("type")?),
            "unary_expression" => {
                let op = self.ctx.text(expr.child_by_field_name("operator")?);
                let inner = self.infer_within(expr.child_by_field_name("operand")?, budget)?;
                match op {
                    "&" => Some(TypeRef {
                        pointer: true,
                        ..inner
                    }),
                    "*" => Some(TypeRef {
                        pointer: false,
                        ..inner
                    }),
                    _ => None,
                }
            }
            "parenthesized_expression" => self.infer_within(first_named(expr)?, budget),
            "call_expression" => self.call_results(expr, budget).into_iter().next().flatten(),
            "index_expression" => {
                self.elements_within(expr.child_by_field_name("operand")?, budget)?
                    .elem
            }
            "selector_expression" => {
                let operand = expr.child_by_field_name("operand")?;
                let field = self.ctx.text(expr.child_by_field_name("field")?);
                if let Some(pkg) = self.package_operand(operand) {
                    let spec = pkg.find_value(field)?;
                    return value_type(self.ctx, spec, budget);
                }
                let owner = self.infer_within(operand, budget)?;
                let (field_ctx, ty) = self.ctx.field(&owner, field)?;
                field_ctx.resolve_type(ty)
            }
            "type_assertion_expression" | "type_conversion_expression" => {
                self.ctx.resolve_type(expr.child_by_field_name("type")?)
            }
            _ => None,
        }
    }

    /// Key and element types of a collection-valued expression.
    pub fn infer_elements(&self, expr: Node<'a>) -> Option<Elements> {
        self.elements_within(expr, INFER_BUDGET)
    }

    fn elements_within(&self, expr: Node<'a>, budget: u8) -> Option<Elements> {
        let budget = budget.checked_sub(1)?;
        let direct = match expr.kind() {
            "identifier" => {
                let name = self.ctx.text(expr);
                match self.locals.get(name) {
                    Some(local) => local.elems.clone(),
                    None => self
                        .ctx
                        .package
                        .find_value(name)
                        .and_then(|spec| value_elements(self.ctx, spec, budget)),
                }
            }
            "composite_literal" => expr
                .child_by_field_name("type")
                .and_then(|t| self.ctx.elements(t)),
            "parenthesized_expression" => {
                first_named(expr).and_then(|inner| self.elements_within(inner, budget))
            }
            "slice_expression" => expr
                .child_by_field_name("operand")
                .and_then(|inner| self.elements_within(inner, budget)),
            "call_expression" => self.call_elements(expr, 0, budget),
            "selector_expression" => self.selector_elements(expr, budget),
            _ => None,
        };
        // A named type defined as a collection: `type Lines []Line`.
        direct.or_else(|| {
            let ty = self.infer_within(expr, budget)?;
            self.ctx.named_elements(&ty, NAMED_HOPS)
        })
    }

    fn selector_elements(&self, expr: Node<'a>, budget: u8) -> Option<Elements> {
        let operand = expr.child_by_field_name("operand")?;
        let field = self.ctx.text(expr.child_by_field_name("field")?);
        if let Some(pkg) = self.package_operand(operand) {
            return value_elements(self.ctx, pkg.find_value(field)?, budget);
        }
        let owner = self.infer_within(operand, budget)?;
        let (field_ctx, ty) = self.ctx.field(&owner, field)?;
        field_ctx.elements(ty)
    }

    /// Package an operand names, when it is an import alias not shadowed by a
    /// local.
    pub fn package_operand(&self, operand: Node<'a>) -> Option<&'a Package> {
        if operand.kind() != "identifier" {
            return None;
        }
        let alias = self.ctx.text(operand);
        if self.is_local(alias) {
            return None;
        }
        self.ctx.model.imported(self.ctx.file, alias)
    }

    /// `true` when an identifier names an import (loaded or not) and no local
    /// shadows it.
    pub fn is_package_name(&self, ident: Node<'a>) -> bool {
        let name = self.ctx.text(ident);
        !self.is_local(name) && self.ctx.model.is_import_name(self.ctx.file, name)
    }

    fn callee(&self, call: Node<'a>, budget: u8) -> Option<Callee<'a>> {
        let function = call.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => {
                let name = self.ctx.text(function);
                if self.is_local(name) {
                    return None;
                }
                package_callee(self.ctx.package, name)
            }
            "selector_expression" => {
                let operand = function.child_by_field_name("operand")?;
                let field = self.ctx.text(function.child_by_field_name("field")?);
                if let Some(pkg) = self.package_operand(operand) {
                    return package_callee(pkg, field);
                }
                let owner = self.infer_within(operand, budget)?;
                self.ctx
                    .method(&owner, field)
                    .map(|m| Callee::Func(m.decl()))
            }
            // `(T)(x)` or `(f)(x)`.
            "parenthesized_expression" => {
                let inner = first_named(function)?;
                let name = self.ctx.text(inner);
                if inner.kind() != "identifier" || self.is_local(name) {
                    return None;
                }
                package_callee(self.ctx.package, name)
            }
            _ => None,
        }
    }

    /// Declared result types of the callee, or the target type of a
    /// conversion `T(x)`.
    fn call_results(&self, call: Node<'a>, budget: u8) -> Vec<Option<TypeRef>> {
        match self.callee(call, budget) {
            Some(Callee::Func(decl)) => results_of(self.ctx.model, decl),
            Some(Callee::Conversion(ty)) => vec![Some(ty)],
            None => Vec::new(),
        }
    }

    /// Collection shape of the callee's `index`th result.
    fn call_elements(&self, call: Node<'a>, index: usize, budget: u8) -> Option<Elements> {
        match self.callee(call, budget)? {
            Callee::Func(decl) => {
                let result = *result_types(decl).get(index)?;
                Ctx::of(self.ctx.model, decl.file)?.elements(result)
            }
            Callee::Conversion(ty) => self.ctx.named_elements(&ty, NAMED_HOPS),
        }
    }
}

enum Callee<'a> {
    Func(Decl<'a>),
    Conversion(TypeRef),
}

fn package_callee<'a>(pkg: &'a Package, name: &str) -> Option<Callee<'a>> {
    if let Some(func) = pkg.find_func(name) {
        return Some(Callee::Func(func));
    }
    pkg.declares_type(name).then(|| {
        Callee::Conversion(TypeRef {
            package: pkg.id.clone(),
            name: name.to_string(),
            pointer: false,
        })
    })
}

fn results_of<'a>(model: &'a SourceModel, decl: Decl<'a>) -> Vec<Option<TypeRef>> {
    let Some(decl_ctx) = Ctx::of(model, decl.file) else {
        return Vec::new();
    };
    result_types(decl)
        .into_iter()
        .map(|n| decl_ctx.resolve_type(n))
        .collect()
}

/// Type of a package-level `var`/`const`: declared, or inferred from its
/// initializer at package scope.
fn value_type<'a>(ctx: Ctx<'a>, spec: ValueSpec<'a>, budget: u8) -> Option<TypeRef> {
    let spec_ctx = Ctx::of(ctx.model, spec.decl.file)?;
    if let Some(ty) = spec.decl.field("type") {
        return spec_ctx.resolve_type(ty);
    }
    let values = named_children(spec.decl.field("value")?);
    let scope = Scope::package(spec_ctx);
    if values.len() == 1 && spec.index > 0 {
        return scope
            .call_results(values[0], budget)
            .get(spec.index)
            .cloned()
            .flatten();
    }
    scope.infer_within(*values.get(spec.index)?, budget)
}

fn value_elements<'a>(ctx: Ctx<'a>, spec: ValueSpec<'a>, budget: u8) -> Option<Elements> {
    let spec_ctx = Ctx::of(ctx.model, spec.decl.file)?;
    if let Some(ty) = spec.decl.field("type") {
        return spec_ctx.elements(ty);
    }
    let values = named_children(spec.decl.field("value")?);
    let scope = Scope::package(spec_ctx);
    if values.len() == 1 && spec.index > 0 {
        return scope.call_elements(values[0], spec.index, budget);
    }
    scope.elements_within(*values.get(spec.index)?, budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn module(files: &[(&str, &str)]) -> (tempfile::TempDir, SourceModel) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let model = SourceModel::load(dir.path()).unwrap();
        (dir, model)
    }

    const STORE: &str = r#"package store

type Item struct{ ID string }

type Store struct {
	items map[string]Item
	Last  *Item
}

type Finder interface {
	Find(id string) (*Item, error)
}

func New() *Store { return &Store{} }

func (s *Store) Get(id string) (Item, bool) {
	it, ok := s.items[id]
	return it, ok
}
"#;

    const CART: &str = r#"package shop

import "example.com/shop/store"

var defaultStore = store.New()

type Cart struct {
	st     *store.Store
	finder store.Finder
}

func (c *Cart) Add(id string) error {
	item, ok := c.st.Get(id)
	found, err := c.finder.Find(id)
	local := defaultStore
	last := c.st.Last
	var explicit store.Item
	_ = ok
	_, _, _, _, _ = item, found, err, local, explicit
	return last
}
"#;

    fn scope_for<'a>(model: &'a SourceModel) -> (Scope<'a>, Ctx<'a>) {
        let (pkg, file) = model.package_of_file(Path::new("cart.go")).unwrap();
        let ctx = Ctx {
            model,
            package: pkg,
            file,
        };
        let (method, _) = pkg.find_method("Cart", "Add").unwrap();
        (Scope::function(ctx, method.node), ctx)
    }

    fn store_type(name: &str, pointer: bool) -> TypeRef {
        TypeRef {
            package: "example.com/shop/store".into(),
            name: name.into(),
            pointer,
        }
    }

    #[test]
    fn infers_locals_from_declarations_calls_and_fields() {
        let (_dir, model) = module(&[
            ("go.mod", "module example.com/shop\n"),
            ("store/store.go", STORE),
            ("cart.go", CART),
        ]);
        let (scope, _) = scope_for(&model);

        assert_eq!(
            scope.local_type("c"),
            Some(&TypeRef {
                package: "example.com/shop".into(),
                name: "Cart".into(),
                pointer: true,
            })
        );
        assert_eq!(scope.local_type("item"), Some(&store_type("Item", false)));
        assert_eq!(scope.local_type("ok"), None);
        assert!(scope.is_local("ok"));
        assert_eq!(scope.local_type("found"), Some(&store_type("Item", true)));
        assert_eq!(scope.local_type("local"), Some(&store_type("Store", true)));
        assert_eq!(scope.local_type("last"), Some(&store_type("Item", true)));
        assert_eq!(scope.local_type("explicit"), Some(&store_type("Item", false)));
        assert!(!scope.is_local("defaultStore"));
    }

    #[test]
    fn builtin_and_stdlib_types_are_unknown() {
        let (_dir, model) = module(&[
            ("go.mod", "module example.com/shop\n"),
            (
                "cart.go",
                "package shop\n\nimport \"strings\"\n\nfunc F(n int, b strings.Builder) {}\n",
            ),
        ]);
        let (pkg, file) = model.package_of_file(Path::new("cart.go")).unwrap();
        let ctx = Ctx {
            model: &model,
            package: pkg,
            file,
        };
        let scope = Scope::function(ctx, pkg.find_func("F").unwrap().node);
        assert!(scope.is_local("n"));
        assert_eq!(scope.local_type("n"), None);
        assert_eq!(scope.local_type("b"), None);
    }

    const LEDGER: &str = r#"package shop

import "example.com/shop/store"

type Line struct{ Qty int }

type Lines []Line

type Base struct{ Owner string }

func (b *Base) Save() error { return nil }

type Repo interface {
	store.Finder
	Close() error
}

type Order struct {
	*Base
	lines  Lines
	byID   map[string]*store.Item
	slots  *[4]Line
	repo   Repo
}

func (o *Order) Walk(extra ...Line) {
	for i, l := range o.lines {
		_, _ = i, l
	}
	for id, it := range o.byID {
		_, _ = id, it
	}
	for _, s := range o.slots {
		_ = s
	}
	for _, e := range extra {
		_ = e
	}
	first := o.lines[0]
	picked, ok := o.byID["a"]
	tail := o.lines[1:]
	owner := o.Owner
	found, err := o.repo.Find("a")
	_, _, _, _, _, _, _ = first, picked, ok, tail, owner, found, err
}
"#;

    fn ledger() -> (tempfile::TempDir, SourceModel) {
        module(&[
            ("go.mod", "module example.com/shop\n"),
            ("store/store.go", STORE),
            ("ledger.go", LEDGER),
        ])
    }

    fn shop_type(name: &str, pointer: bool) -> TypeRef {
        TypeRef {
            package: "example.com/shop".into(),
            name: name.into(),
            pointer,
        }
    }

    fn walk_scope<'a>(model: &'a SourceModel) -> Scope<'a> {
        let (pkg, file) = model.package_of_file(Path::new("ledger.go")).unwrap();
        let ctx = Ctx {
            model,
            package: pkg,
            file,
        };
        let (method, _) = pkg.find_method("Order", "Walk").unwrap();
        Scope::function(ctx, method.node)
    }

    #[test]
    fn range_variables_take_key_and_element_types() {
        let (_dir, model) = ledger();
        let scope = walk_scope(&model);

        assert!(scope.is_local("i"));
        assert_eq!(scope.local_type("i"), None);
        assert_eq!(scope.local_type("l"), Some(&shop_type("Line", false)));
        assert_eq!(scope.local_type("id"), None);
        assert_eq!(scope.local_type("it"), Some(&store_type("Item", true)));
        assert_eq!(scope.local_type("s"), Some(&shop_type("Line", false)));
        assert_eq!(scope.local_type("e"), Some(&shop_type("Line", false)));
    }

    #[test]
    fn index_and_slice_expressions_keep_element_types() {
        let (_dir, model) = ledger();
        let scope = walk_scope(&model);

        assert_eq!(scope.local_type("first"), Some(&shop_type("Line", false)));
        assert_eq!(scope.local_type("picked"), Some(&store_type("Item", true)));
        assert_eq!(scope.local_type("ok"), None);
        assert_eq!(scope.local_type("tail"), None);
        assert_eq!(
            scope.locals.get("tail").and_then(|l| l.elems.clone()),
            Some(Elements {
                key: None,
                elem: Some(shop_type("Line", false)),
            })
        );
    }

    #[test]
    fn promoted_fields_and_methods_are_found_through_embedding() {
        let (_dir, model) = ledger();
        let scope = walk_scope(&model);
        let ctx = scope.ctx();

        assert_eq!(scope.local_type("owner"), None);
        assert!(ctx.field(&shop_type("Order", true), "Owner").is_some());

        match ctx.method(&shop_type("Order", true), "Save") {
            Some(Method::Concrete { receiver, package, .. }) => {
                assert_eq!(receiver.type_name, "Base");
                assert_eq!(package.id, "example.com/shop");
            }
            _ => panic!("Save should be promoted from Base"),
        }

        match ctx.method(&shop_type("Repo", false), "Find") {
            Some(Method::Interface { spec, package, .. }) => {
                assert_eq!(package.id, "example.com/shop/store");
                assert_eq!(spec.field("name").map(|n| spec.file.text(n)), Some("Finder"));
            }
            _ => panic!("Find should come from the embedded Finder"),
        }
        assert_eq!(scope.local_type("found"), Some(&store_type("Item", true)));
        assert!(ctx.method(&shop_type("Order", false), "Missing").is_none());
    }

    #[test]
    fn self_embedding_terminates() {
        let (_dir, model) = module(&[
            ("go.mod", "module example.com/loop\n"),
            (
                "loop.go",
                "package loop\n\ntype A struct{ *B }\n\ntype B struct{ *A }\n\ntype I interface{ J }\n\ntype J interface{ I }\n",
            ),
        ]);
        let (pkg, file) = model.package_of_file(Path::new("loop.go")).unwrap();
        let ctx = Ctx {
            model: &model,
            package: pkg,
            file,
        };
        let ty = |name: &str| TypeRef {
            package: "example.com/loop".into(),
            name: name.into(),
            pointer: false,
        };
        assert!(ctx.method(&ty("A"), "Run").is_none());
        assert!(ctx.field(&ty("A"), "x").is_none());
        assert!(ctx.method(&ty("I"), "Run").is_none());
    }
}
