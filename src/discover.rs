//! Candidate module discovery over the interpreter's search paths.
//!
//! Directories are enumerated without importing anything. A package's
//! component modules are always yielded before the package itself, so the
//! importer has submodules available by the time the parent aggregates
//! them. Directories without an `__init__.py` get one extra level of the
//! same treatment (namespace packages).

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::model::ModuleRecord;

/// Directory names never descended into.
const SKIP_DIRS: [&str; 3] = ["test", "site-packages", "site-packages-forced"];

/// One discovery result: either an importable candidate or a record for a
/// name rejected by policy before any import attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered {
    Candidate { name: String, file: PathBuf },
    Ignored(ModuleRecord),
}

/// Lazy enumeration of candidates across search-path roots.
///
/// Names in `done` are skipped silently (they are already in the database);
/// names in `ignore` yield an IGNORE record carrying the configured reason
/// so every known name has an explanation on disk.
pub struct Discovery {
    roots: VecDeque<PathBuf>,
    pending: VecDeque<(String, PathBuf)>,
    ignore: BTreeMap<String, String>,
    done: HashSet<String>,
    exclude_prefix: Option<PathBuf>,
}

impl Discovery {
    pub fn new(
        search_paths: &[PathBuf],
        ignore: &BTreeMap<String, String>,
        done: &HashSet<String>,
        exclude_prefix: Option<&Path>,
    ) -> Self {
        Self {
            roots: search_paths.iter().cloned().collect(),
            pending: VecDeque::new(),
            ignore: ignore.clone(),
            done: done.clone(),
            exclude_prefix: exclude_prefix.map(PathBuf::from),
        }
    }
}

impl Iterator for Discovery {
    type Item = Discovered;

    fn next(&mut self) -> Option<Discovered> {
        loop {
            if let Some((name, file)) = self.pending.pop_front() {
                if self.done.contains(&name) {
                    continue;
                }
                if let Some(reason) = self.ignore.get(&name) {
                    return Some(Discovered::Ignored(ModuleRecord::ignored(
                        name,
                        Some(file),
                        reason.clone(),
                    )));
                }
                return Some(Discovered::Candidate { name, file });
            }
            let root = self.roots.pop_front()?;
            self.pending = candidates_in_dir(&root, self.exclude_prefix.as_deref()).into();
        }
    }
}

/// Candidate `(module name, origin file)` pairs of one search-path
/// directory, in emission order.
pub fn candidates_in_dir(path: &Path, exclude_prefix: Option<&Path>) -> Vec<(String, PathBuf)> {
    let mut out = Vec::new();
    if !path.is_dir() {
        return out;
    }
    if let Some(prefix) = exclude_prefix {
        if path.starts_with(prefix) {
            return out;
        }
    }
    for item in sorted_entries(path) {
        if let Some(stem) = py_stem(&item) {
            out.push((stem, item.clone()));
            continue;
        }
        if !item.is_dir() || is_skipped_dir(&item) {
            continue;
        }
        let pkg_name = dir_name(&item);
        if item.join("__init__.py").is_file() {
            push_package(&mut out, &pkg_name, &item);
        } else {
            // One more level of the namespace-package heuristic.
            for pkg in sorted_entries(&item) {
                if pkg.is_dir() && pkg.join("__init__.py").is_file() {
                    push_package(&mut out, &format!("{pkg_name}.{}", dir_name(&pkg)), &pkg);
                }
            }
        }
    }
    out
}

/// Yield a package's component modules, then the package itself.
fn push_package(out: &mut Vec<(String, PathBuf)>, pkg_name: &str, dir: &Path) {
    for sub in sorted_entries(dir) {
        match py_stem(&sub) {
            Some(stem) if stem != "__init__" && stem != "__main__" => {
                out.push((format!("{pkg_name}.{stem}"), sub));
            }
            _ => {}
        }
    }
    out.push((pkg_name.to_string(), dir.to_path_buf()));
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|rd| rd.flatten().map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

fn py_stem(path: &Path) -> Option<String> {
    if !path.is_file() || path.extension().map_or(true, |e| e != "py") {
        return None;
    }
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

fn is_skipped_dir(path: &Path) -> bool {
    SKIP_DIRS.iter().any(|d| dir_name(path) == *d)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
