// src/context/examples.rs
//
// Samples existing test files near the focal package as style examples.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::ExampleError;
use crate::model::{tested_path_for, FocalFunction};
use crate::source::SourceModel;

/// How many package-path levels above the focal package still count as near.
const ANCESTOR_LEVELS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleTest {
    pub path: PathBuf,
    pub content: String,
}

pub struct ExampleTestSelector<'a> {
    model: &'a SourceModel,
    count: usize,
    include_focal_test: bool,
}

impl<'a> ExampleTestSelector<'a> {
    pub fn new(model: &'a SourceModel, count: usize) -> Self {
        Self {
            model,
            count,
            include_focal_test: false,
        }
    }

    /// Also include the focal function's own test file when it exists.
    pub fn include_focal_test(mut self, yes: bool) -> Self {
        self.include_focal_test = yes;
        self
    }

    pub fn select<R: Rng + ?Sized>(
        &self,
        focal: &FocalFunction,
        rng: &mut R,
    ) -> Result<Vec<ExampleTest>, ExampleError> {
        let prefixes = ancestor_prefixes(&focal.package.id, ANCESTOR_LEVELS);
        let candidates = self.candidates(&prefixes);
        tracing::debug!(candidates = candidates.len(), "example test candidates");

        let mut picked = Vec::new();
        for path in candidates.choose_multiple(rng, self.count) {
            picked.push(ExampleTest {
                path: path.clone(),
                content: read(path)?,
            });
        }

        if self.include_focal_test {
            let own = focal.test_location().path;
            if !picked.iter().any(|e| e.path == own) {
                match fs::read_to_string(&own) {
                    Ok(content) => picked.push(ExampleTest { path: own, content }),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => return Err(ExampleError::Read { path: own, source }),
                }
            }
        }

        Ok(picked)
    }

    /// Test files of every package under one of `prefixes` whose tested
    /// source file still exists, sorted by path.
    fn candidates(&self, prefixes: &[String]) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self
            .model
            .packages()
            // Plain string prefix: `pkg/foo` also takes in `pkg/foobar`.
            .filter(|p| prefixes.iter().any(|prefix| p.id.starts_with(prefix.as_str())))
            .flat_map(|p| p.test_files())
            .filter(|f| tested_path_for(&f.path).is_some_and(|src| src.is_file()))
            .map(|f| f.path.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// `a/b/c/d` with 3 levels: `a/b/c/d`, `a/b/c`, `a/b`.
pub fn ancestor_prefixes(package_id: &str, levels: usize) -> Vec<String> {
    let parts: Vec<&str> = package_id.split('/').collect();
    (0..levels)
        .take_while(|i| parts.len() > *i)
        .map(|i| parts[..parts.len() - i].join("/"))
        .collect()
}

fn read(path: &Path) -> Result<String, ExampleError> {
    fs::read_to_string(path).map_err(|source| ExampleError::Read {
        path: path.to_path_buf(),
        source,
    })
}
