// src/context/closure.rs
//
// Usage closure of the focal function: every module definition its body
// refers to, resolved to source text.
//
// Guarantees:
// - Keys are unique; iteration order is stable
// - Interface dispatch never carries a body
// - Concrete functions and methods always carry their full declaration
// - Bounded depth, visited-set keyed by identity

use std::collections::HashSet;

use tree_sitter::Node;

use super::resolve::FocalDecl;
use crate::model::{
    Definition, FunctionDefinition, QualifiedName, Receiver, ReceiverKind, TypeDefinition,
    UsageClosure,
};
use crate::source::binder::{Ctx, Method, Scope, TypeRef};
use crate::source::parser::walk;
use crate::source::{Decl, Package, SourceModel};

pub struct UsageClosureExtractor<'a> {
    model: &'a SourceModel,
    depth: usize,
}

impl<'a> UsageClosureExtractor<'a> {
    pub fn new(model: &'a SourceModel) -> Self {
        Self { model, depth: 1 }
    }

    /// Levels of function bodies to scan; 1 scans the focal body only.
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth.max(1);
        self
    }

    pub fn extract(&self, focal: &FocalDecl<'a>) -> UsageClosure {
        let focal_id = focal.id();
        let mut uses = UsageClosure::new();
        let mut visited = HashSet::from([focal_id.clone()]);
        let mut frontier = vec![focal.decl];

        for level in 0..self.depth {
            let mut next = Vec::new();
            for decl in frontier {
                for (def, inlined) in self.scan(decl) {
                    let id = def.id().clone();
                    // Recursion is not context.
                    if id == focal_id {
                        continue;
                    }
                    if visited.insert(id.clone()) {
                        next.extend(inlined);
                    }
                    uses.insert(id, def);
                }
            }
            tracing::debug!(level, definitions = uses.len(), "closure level scanned");
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        uses
    }

    /// Definitions referenced directly by one declaration's body, each with
    /// the declaration to scan at the next level (functions only).
    fn scan(&self, decl: Decl<'a>) -> Vec<(Definition, Option<Decl<'a>>)> {
        let (Some(ctx), Some(body)) = (Ctx::of(self.model, decl.file), decl.field("body")) else {
            return Vec::new();
        };
        let scope = Scope::function(ctx, decl.node);
        let mut found = Vec::new();
        walk(body, &mut |node| found.extend(reference(&scope, node)));
        found
    }
}

type Hit<'a> = (Definition, Option<Decl<'a>>);

fn reference<'a>(scope: &Scope<'a>, node: Node<'a>) -> Vec<Hit<'a>> {
    let ctx = scope.ctx();
    let hit = match node.kind() {
        "identifier" => identifier(scope, node),
        "type_identifier" if node.parent().map(|p| p.kind()) != Some("qualified_type") => {
            ctx.resolve_type(node).and_then(|ty| type_hit(ctx, &ty))
        }
        "qualified_type" => ctx.resolve_type(node).and_then(|ty| type_hit(ctx, &ty)),
        "selector_expression" => return selector(scope, node).unwrap_or_default(),
        _ => None,
    };
    hit.into_iter().collect()
}

fn identifier<'a>(scope: &Scope<'a>, node: Node<'a>) -> Option<Hit<'a>> {
    if is_struct_key(node) {
        return None;
    }
    let ctx = scope.ctx();
    let name = ctx.text(node);
    if scope.is_local(name) {
        return type_hit(ctx, scope.local_type(name)?);
    }
    if scope.is_package_name(node) {
        return None;
    }
    if let Some(func) = ctx.package.find_func(name) {
        return Some(function_hit(ctx.package, func, None));
    }
    if let Some(spec) = ctx.package.find_type(name) {
        return Some((type_def(ctx.package, spec), None));
    }
    type_hit(ctx, &scope.infer(node)?)
}

fn selector<'a>(scope: &Scope<'a>, node: Node<'a>) -> Option<Vec<Hit<'a>>> {
    let ctx = scope.ctx();
    let operand = node.child_by_field_name("operand")?;
    let field = ctx.text(node.child_by_field_name("field")?);

    if let Some(pkg) = scope.package_operand(operand) {
        if let Some(func) = pkg.find_func(field) {
            return Some(vec![function_hit(pkg, func, None)]);
        }
        if let Some(spec) = pkg.find_type(field) {
            return Some(vec![(type_def(pkg, spec), None)]);
        }
        return type_hit(ctx, &scope.infer(node)?).map(|hit| vec![hit]);
    }
    if operand.kind() == "identifier" && scope.is_package_name(operand) {
        return None;
    }

    let owner = scope.infer(operand)?;
    match ctx.method(&owner, field) {
        Some(Method::Concrete {
            package,
            decl,
            receiver,
        }) => Some(vec![function_hit(package, decl, Some(receiver))]),
        Some(Method::Interface {
            package,
            spec,
            decl,
        }) => {
            let iface = spec.field("name").map(|n| spec.file.text(n))?;
            let mut hits = vec![(interface_method_def(package, iface, decl), None)];
            // Inherited from an embedded interface: its declaration is context too.
            if iface != owner.name || package.id != owner.package {
                hits.push((type_def(package, spec), None));
            }
            Some(hits)
        }
        None => {
            let (field_ctx, ty) = ctx.field(&owner, field)?;
            type_hit(ctx, &field_ctx.resolve_type(ty)?).map(|hit| vec![hit])
        }
    }
}

/// Key of a keyed struct literal element: `Cart{Items: x}`.
fn is_struct_key(node: Node<'_>) -> bool {
    let key = match node.parent() {
        Some(p) if p.kind() == "literal_element" => p,
        _ => node,
    };
    match key.parent() {
        Some(p) if p.kind() == "keyed_element" => p.child_by_field_name("key") == Some(key),
        _ => false,
    }
}

fn type_hit<'a>(ctx: Ctx<'a>, ty: &TypeRef) -> Option<Hit<'a>> {
    let (pkg, spec) = ctx.type_decl(ty)?;
    Some((type_def(pkg, spec), None))
}

fn function_hit<'a>(pkg: &Package, decl: Decl<'a>, receiver: Option<Receiver>) -> Hit<'a> {
    let name = decl
        .field("name")
        .map(|n| decl.file.text(n))
        .unwrap_or_default()
        .to_string();
    let def = FunctionDefinition {
        id: QualifiedName::for_func(&pkg.id, receiver.as_ref(), &name),
        name,
        package: pkg.reference(),
        file: Some(decl.path().to_path_buf()),
        receiver,
        signature: decl.signature().to_string(),
        body: Some(decl.text().to_string()),
    };
    (Definition::Function(def), Some(decl))
}

fn interface_method_def(pkg: &Package, iface: &str, method: Decl<'_>) -> Definition {
    let name = method
        .field("name")
        .map(|n| method.file.text(n))
        .unwrap_or_default()
        .to_string();
    let receiver = Receiver {
        type_name: iface.to_string(),
        kind: ReceiverKind::Interface,
    };
    Definition::Function(FunctionDefinition {
        id: QualifiedName::for_func(&pkg.id, Some(&receiver), &name),
        name,
        package: pkg.reference(),
        file: Some(method.path().to_path_buf()),
        receiver: Some(receiver),
        signature: method.text().to_string(),
        body: None,
    })
}

fn type_def(pkg: &Package, spec: Decl<'_>) -> Definition {
    let name = spec
        .field("name")
        .map(|n| spec.file.text(n))
        .unwrap_or_default()
        .to_string();
    Definition::Type(TypeDefinition {
        id: QualifiedName::for_type(&pkg.id, &name),
        name,
        package: pkg.reference(),
        file: spec.path().to_path_buf(),
        body: format!("type {}", spec.text()),
    })
}
