// src/context/resolve.rs
//
// Locates the focal function's declaration in one file of the Source Model.

use std::path::Path;

use crate::error::ResolveError;
use crate::model::{FocalFunction, QualifiedName, Receiver, ReceiverKind, UsageClosure};
use crate::source::package::method_receiver;
use crate::source::{Decl, Package, SourceModel};

/// What the user asked for: `Name`, `Recv.Name` or `(*Recv).Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FocalQuery<'q> {
    receiver: Option<&'q str>,
    pointer_only: bool,
    name: &'q str,
}

impl<'q> FocalQuery<'q> {
    fn parse(raw: &'q str) -> Self {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("(*") {
            if let Some((recv, name)) = rest.split_once(").") {
                return Self {
                    receiver: Some(recv),
                    pointer_only: true,
                    name,
                };
            }
        }
        match raw.split_once('.') {
            Some((recv, name)) => Self {
                receiver: Some(recv),
                pointer_only: false,
                name,
            },
            None => Self {
                receiver: None,
                pointer_only: false,
                name: raw,
            },
        }
    }

    fn matches(&self, name: &str, receiver: Option<&Receiver>) -> bool {
        if name != self.name {
            return false;
        }
        match (self.receiver, receiver) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(want), Some(have)) => {
                want == have.type_name && (!self.pointer_only || have.kind == ReceiverKind::Pointer)
            }
        }
    }
}

/// The matched declaration, still borrowing the Source Model so the closure
/// walk can traverse its body.
pub struct FocalDecl<'a> {
    pub package: &'a Package,
    pub decl: Decl<'a>,
    pub name: String,
    pub receiver: Option<Receiver>,
}

impl<'a> FocalDecl<'a> {
    pub fn id(&self) -> QualifiedName {
        QualifiedName::for_func(&self.package.id, self.receiver.as_ref(), &self.name)
    }

    pub fn into_focal(self, uses: UsageClosure) -> FocalFunction {
        FocalFunction {
            id: self.id(),
            name: self.name,
            source: self.decl.text().to_string(),
            package: self.package.reference(),
            file: self.decl.path().to_path_buf(),
            uses,
        }
    }
}

pub struct FocalFunctionResolver<'a> {
    model: &'a SourceModel,
}

impl<'a> FocalFunctionResolver<'a> {
    pub fn new(model: &'a SourceModel) -> Self {
        Self { model }
    }

    /// Exactly one function or method declaration in `file` matching `name`.
    pub fn resolve(&self, file: &Path, name: &str) -> Result<FocalDecl<'a>, ResolveError> {
        let (package, go_file) = self
            .model
            .package_of_file(file)
            .ok_or_else(|| ResolveError::FileNotLoaded(file.to_path_buf()))?;
        let query = FocalQuery::parse(name);

        let mut found = Vec::new();
        for node in go_file.top_level() {
            if !matches!(node.kind(), "function_declaration" | "method_declaration") {
                continue;
            }
            let decl = Decl {
                file: go_file,
                node,
            };
            let Some(decl_name) = decl.field("name").map(|n| go_file.text(n)) else {
                continue;
            };
            let receiver = if node.kind() == "method_declaration" {
                method_receiver(decl)
            } else {
                None
            };
            if query.matches(decl_name, receiver.as_ref()) {
                found.push(FocalDecl {
                    package,
                    decl,
                    name: decl_name.to_string(),
                    receiver,
                });
            }
        }

        match found.len() {
            0 => Err(ResolveError::NotFound {
                name: name.to_string(),
                file: go_file.path.clone(),
            }),
            1 => {
                let focal = found.remove(0);
                tracing::debug!(id = %focal.id(), "resolved focal function");
                Ok(focal)
            }
            _ => Err(ResolveError::Ambiguous {
                name: name.to_string(),
                file: go_file.path.clone(),
                candidates: found.iter().map(|f| f.id().to_string()).collect(),
            }),
        }
    }
}
