// src/model.rs
//
// Identities and definitions shared by the resolver, the closure walk and the
// prompt assembler.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/* ============================================================
   Identity
   ============================================================ */

/// Globally unique key of a Go declaration: package path, optional receiver,
/// declaration name. Pointer receivers are spelled `(*T)` so `func (T) M`
/// and `func (*T) M` never share a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName(String);

impl QualifiedName {
    pub fn for_type(pkg_path: &str, name: &str) -> Self {
        Self(format!("{pkg_path}.{name}"))
    }

    pub fn for_func(pkg_path: &str, receiver: Option<&Receiver>, name: &str) -> Self {
        match receiver {
            None => Self(format!("{pkg_path}.{name}")),
            Some(r) => Self(format!("{pkg_path}.{}.{name}", r.qualifier())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRef {
    /// Import path, e.g. `example.com/shop/billing`.
    pub id: String,
    /// Short name from the package clause, e.g. `billing`.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverKind {
    Value,
    Pointer,
    /// Method reached through an interface; the implementation is unknown.
    Interface,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receiver {
    pub type_name: String,
    pub kind: ReceiverKind,
}

impl Receiver {
    pub fn qualifier(&self) -> String {
        match self.kind {
            ReceiverKind::Pointer => format!("(*{})", self.type_name),
            ReceiverKind::Value | ReceiverKind::Interface => self.type_name.clone(),
        }
    }
}

/* ============================================================
   Definitions
   ============================================================ */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub id: QualifiedName,
    pub name: String,
    pub package: PackageRef,
    pub file: Option<PathBuf>,
    pub receiver: Option<Receiver>,
    /// Declared signature as written in source.
    pub signature: String,
    /// Full declaration text; `None` for interface dispatch.
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub id: QualifiedName,
    pub name: String,
    pub package: PackageRef,
    pub file: PathBuf,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    Function(FunctionDefinition),
    Type(TypeDefinition),
}

impl Definition {
    pub fn id(&self) -> &QualifiedName {
        match self {
            Definition::Function(f) => &f.id,
            Definition::Type(t) => &t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Definition::Function(f) => &f.name,
            Definition::Type(t) => &t.name,
        }
    }

    pub fn package(&self) -> &PackageRef {
        match self {
            Definition::Function(f) => &f.package,
            Definition::Type(t) => &t.package,
        }
    }

    pub fn file(&self) -> Option<&Path> {
        match self {
            Definition::Function(f) => f.file.as_deref(),
            Definition::Type(t) => Some(&t.file),
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Definition::Function(f) => f.body.as_deref(),
            Definition::Type(t) => Some(&t.body),
        }
    }
}

/// Definitions referenced by the focal function, keyed by identity.
/// Ordered so every consumer sees the same iteration order.
pub type UsageClosure = BTreeMap<QualifiedName, Definition>;

/* ============================================================
   Focal function
   ============================================================ */

#[derive(Debug, Clone)]
pub struct FocalFunction {
    pub id: QualifiedName,
    pub name: String,
    pub source: String,
    pub package: PackageRef,
    pub file: PathBuf,
    pub uses: UsageClosure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestLocation {
    pub path: PathBuf,
    pub package: PackageRef,
}

impl FocalFunction {
    /// `pkg/calc.go` -> `pkg/calc_test.go`, same package.
    pub fn test_location(&self) -> TestLocation {
        TestLocation {
            path: test_path_for(&self.file),
            package: self.package.clone(),
        }
    }

    /// Closure grouped by package short name, both levels in stable order.
    pub fn definitions_by_package(&self) -> BTreeMap<&str, Vec<&Definition>> {
        let mut groups: BTreeMap<&str, Vec<&Definition>> = BTreeMap::new();
        for def in self.uses.values() {
            groups.entry(def.package().name.as_str()).or_default().push(def);
        }
        groups
    }
}

pub fn test_path_for(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}_test.go"))
}

/// Inverse of [`test_path_for`]; `None` when `test` is not a test file.
pub fn tested_path_for(test: &Path) -> Option<PathBuf> {
    let name = test.file_name()?.to_str()?;
    let stem = name.strip_suffix("_test.go")?;
    Some(test.with_file_name(format!("{stem}.go")))
}
