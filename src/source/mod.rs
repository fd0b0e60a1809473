// src/source/mod.rs
//
// In-process model of a Go module: every package under the module root,
// parsed once with tree-sitter and read-only afterwards.
//
// Guarantees:
// - Deterministic package and file order
// - All syntax errors reported together
// - Nested modules, vendor/, testdata/ and hidden directories skipped

pub mod binder;
pub mod package;
pub mod parser;

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use walkdir::{DirEntry, WalkDir};

use crate::error::LoadError;

pub use package::{Decl, GoFile, Import, Package};

pub struct SourceModel {
    root: PathBuf,
    module_path: String,
    packages: BTreeMap<String, Package>,
}

impl SourceModel {
    pub fn load(root: &Path) -> Result<Self, LoadError> {
        let root = fs::canonicalize(root).map_err(|source| LoadError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let module_path = read_module_path(&root)?;

        let mut by_dir: BTreeMap<PathBuf, Vec<GoFile>> = BTreeMap::new();
        let mut errors = Vec::new();

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored(e));

        for entry in walker {
            let entry = entry.map_err(|e| LoadError::Io {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone()),
                source: e.into(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("go")
            {
                continue;
            }

            let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let tree = parser::parse_go(&source)?;
            for (line, col, what) in parser::syntax_errors(tree.root_node()) {
                errors.push(format!("{}:{line}:{col}: {what}", path.display()));
            }

            let dir = path.parent().unwrap_or(&root).to_path_buf();
            by_dir
                .entry(dir)
                .or_default()
                .push(GoFile::new(path.to_path_buf(), source, tree));
        }

        if !errors.is_empty() {
            return Err(LoadError::Syntax(errors));
        }

        let mut packages = BTreeMap::new();
        for (dir, files) in by_dir {
            let id = package_id(&module_path, &root, &dir);
            let name = package_name(&files);
            tracing::debug!(package = %id, files = files.len(), "loaded package");
            packages.insert(
                id.clone(),
                Package {
                    id,
                    name,
                    dir,
                    files,
                },
            );
        }

        Ok(Self {
            root,
            module_path,
            packages,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn package(&self, id: &str) -> Option<&Package> {
        self.packages.get(id)
    }

    /// Absolute form of `path`, resolving relative paths against the root.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        fs::canonicalize(&joined).unwrap_or(joined)
    }

    /// `path` relative to the module root, when it lies inside it.
    pub fn relative<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.strip_prefix(&self.root).ok()
    }

    pub fn package_of_file(&self, path: &Path) -> Option<(&Package, &GoFile)> {
        let path = self.absolute(path);
        let dir = path.parent()?;
        self.packages
            .values()
            .filter(|p| p.dir == dir)
            .find_map(|p| p.file(&path).map(|f| (p, f)))
    }

    /// Package that owns an already-loaded file.
    pub fn package_containing(&self, file: &GoFile) -> Option<&Package> {
        let dir = file.path.parent()?;
        self.packages.values().find(|p| p.dir == dir)
    }

    /// Loaded package that `alias` names inside `file`, if it is part of the
    /// module. Standard library and third-party imports resolve to `None`.
    pub fn imported(&self, file: &GoFile, alias: &str) -> Option<&Package> {
        file.imports.iter().find_map(|imp| {
            let pkg = self.packages.get(&imp.path);
            let name = match (&imp.alias, pkg) {
                (Some(a), _) => a.as_str(),
                (None, Some(p)) => p.name.as_str(),
                (None, None) => imp.default_name(),
            };
            if name == alias {
                pkg
            } else {
                None
            }
        })
    }

    /// `true` when `alias` is an import name in `file`, loaded or not.
    pub fn is_import_name(&self, file: &GoFile, alias: &str) -> bool {
        file.imports.iter().any(|imp| match &imp.alias {
            Some(a) => a == alias,
            None => self
                .packages
                .get(&imp.path)
                .map(|p| p.name == alias)
                .unwrap_or_else(|| imp.default_name() == alias),
        })
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if !entry.file_type().is_dir() {
        return false;
    }
    name.starts_with('.')
        || name.starts_with('_')
        || name == "vendor"
        || name == "testdata"
        || entry.path().join("go.mod").is_file()
}

fn read_module_path(root: &Path) -> Result<String, LoadError> {
    let go_mod = root.join("go.mod");
    let text = fs::read_to_string(&go_mod).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoadError::NoModule(root.to_path_buf())
        } else {
            LoadError::Io {
                path: go_mod.clone(),
                source,
            }
        }
    })?;
    text.lines()
        .map(|l| l.split("//").next().unwrap_or("").trim())
        .find_map(|l| l.strip_prefix("module"))
        .map(|m| m.trim().trim_matches('"').to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| LoadError::NoModulePath(root.to_path_buf()))
}

fn package_id(module_path: &str, root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => {
            let rel: Vec<_> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            format!("{module_path}/{}", rel.join("/"))
        }
        _ => module_path.to_string(),
    }
}

fn package_name(files: &[GoFile]) -> String {
    files
        .iter()
        .find(|f| !f.is_test())
        .or_else(|| files.first())
        .map(|f| {
            f.package_name
                .strip_suffix("_test")
                .unwrap_or(&f.package_name)
                .to_string()
        })
        .unwrap_or_default()
}
