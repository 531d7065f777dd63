//! Locating Houdini installations on the local machine.
//!
//! An installation is a version directory whose `bin/hython` exists. The
//! `$HFS` environment variable takes priority; otherwise the platform's
//! conventional install roots are scanned and the version is parsed from
//! the directory name (`hfs20.5.584` on Linux, `Houdini 20.5.584`
//! elsewhere). The crawl's search paths derive from the installation's
//! `houdini/python*libs` directory and its `site-packages*` subdirectories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub const HFS_VAR: &str = "HFS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoudiniInstall {
    /// Dotted version string, e.g. `20.5.584`.
    pub version: String,
    /// The installation root (`$HFS`).
    pub hfs: PathBuf,
    pub hython: PathBuf,
    /// Python library roots to enumerate for candidate modules.
    pub search_paths: Vec<PathBuf>,
}

/// All valid installations, newest version first. An `$HFS` override, when
/// set and valid, is returned alone.
pub fn find_installations() -> Vec<HoudiniInstall> {
    if let Ok(hfs) = std::env::var(HFS_VAR) {
        if let Some(install) = install_at(Path::new(&hfs)) {
            return vec![install];
        }
        eprintln!("[houscan] Warning: $HFS is set but holds no usable installation: {hfs}");
    }
    let mut installs: Vec<HoudiniInstall> = Vec::new();
    for root in platform_roots() {
        let Ok(entries) = std::fs::read_dir(&root) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            if version_from_dir_name(&name.to_string_lossy()).is_some() {
                if let Some(install) = install_at(&path) {
                    installs.push(install);
                }
            }
        }
    }
    installs.sort_by(|a, b| parse_version(&b.version).cmp(&parse_version(&a.version)));
    installs
}

/// Pick the install matching `requested` (a full version or a `major.minor`
/// prefix), or the newest one when no version was asked for.
pub fn select_installation(
    installs: Vec<HoudiniInstall>,
    requested: Option<&str>,
) -> Result<HoudiniInstall> {
    match requested {
        None => installs
            .into_iter()
            .next()
            .context("No Houdini installation found"),
        Some(version) => {
            let wanted = parse_version(version);
            installs
                .into_iter()
                .find(|i| {
                    i.version == version || parse_version(&i.version).starts_with(&wanted)
                })
                .with_context(|| format!("No Houdini {version} installation found"))
        }
    }
}

/// Probe one candidate root. Valid means `bin/hython` exists; the version
/// comes from the directory name.
pub fn install_at(hfs: &Path) -> Option<HoudiniInstall> {
    let hython = hfs.join("bin").join(hython_name());
    if !hython.is_file() {
        return None;
    }
    let name = hfs.file_name()?.to_string_lossy();
    let version = version_from_dir_name(&name)?;
    Some(HoudiniInstall {
        version,
        hfs: hfs.to_path_buf(),
        hython,
        search_paths: python_lib_paths(hfs),
    })
}

fn hython_name() -> &'static str {
    if cfg!(windows) {
        "hython.exe"
    } else {
        "hython"
    }
}

fn platform_roots() -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Applications")]
    } else if cfg!(windows) {
        vec![PathBuf::from(r"C:\Program Files\Side Effects Software")]
    } else {
        vec![PathBuf::from("/opt")]
    }
}

/// `hfs20.5.584`, `Houdini 20.5.584`, `Houdini20.5` and a bare `20.5.584`
/// all parse; anything else is not an installation directory.
pub fn version_from_dir_name(name: &str) -> Option<String> {
    let rest = if let Some(r) = strip_prefix_ci(name, "hfs") {
        r
    } else if let Some(r) = strip_prefix_ci(name, "houdini") {
        r.trim_start_matches(' ')
    } else {
        name
    };
    let ok = !rest.is_empty()
        && rest.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
        });
    ok.then(|| rest.to_string())
}

fn strip_prefix_ci<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &name[prefix.len()..])
}

fn parse_version(version: &str) -> Vec<u32> {
    version
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

/// The `houdini/python*libs` directory of the newest bundled Python, plus
/// its `site-packages*` directories. Together these cover what hython puts
/// on its own module search path.
fn python_lib_paths(hfs: &Path) -> Vec<PathBuf> {
    let houdini_dir = hfs.join("houdini");
    let Ok(entries) = std::fs::read_dir(&houdini_dir) else {
        return Vec::new();
    };
    let mut libs: Vec<(Vec<u32>, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let version = name.strip_prefix("python")?.strip_suffix("libs")?;
            let path = entry.path();
            path.is_dir().then(|| (parse_version(version), path))
        })
        .collect();
    libs.sort();
    let Some((_, libs_dir)) = libs.pop() else {
        return Vec::new();
    };
    let mut paths = vec![libs_dir.clone()];
    if let Ok(entries) = std::fs::read_dir(&libs_dir) {
        let mut extra: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("site-packages")
                    && entry.path().is_dir()
            })
            .map(|entry| entry.path())
            .collect();
        extra.sort();
        paths.append(&mut extra);
    }
    paths
}

/// Version-stamped default database location under the user's data
/// directory.
pub fn default_db_path(version: &str) -> Result<PathBuf> {
    let Some(data) = dirs::data_dir() else {
        bail!("Could not determine the user data directory");
    };
    Ok(data
        .join("houscan")
        .join(version)
        .join("houdini_static_data.db"))
}

/// Module names never imported, with the reason stored alongside. Mostly
/// interpreter standard library; plus third-party packages Houdini bundles
/// that are documented elsewhere.
pub fn default_ignore() -> BTreeMap<String, String> {
    const STDLIB: &[&str] = &[
        "abc", "argparse", "array", "ast", "asyncio", "atexit", "base64", "binascii", "bisect",
        "builtins", "bz2", "calendar", "codecs", "collections", "collections.abc", "concurrent",
        "concurrent.futures", "configparser", "contextlib", "contextvars", "copy", "copyreg",
        "csv", "ctypes", "dataclasses", "datetime", "decimal", "difflib", "email", "encodings",
        "enum", "errno", "fnmatch", "functools", "gc", "getpass", "glob", "gzip", "hashlib",
        "heapq", "html", "http", "importlib", "importlib.util", "inspect", "io", "ipaddress",
        "itertools", "json", "keyword", "linecache", "locale", "logging", "lzma", "marshal",
        "math", "mimetypes", "mmap", "multiprocessing", "numbers", "operator", "os", "pathlib",
        "pickle", "pkgutil", "platform", "posix", "posixpath", "pprint", "pwd", "pydoc",
        "queue", "random", "re", "readline", "reprlib", "resource", "secrets", "select",
        "selectors", "shlex", "shutil", "signal", "socket", "socketserver", "ssl", "stat",
        "statistics", "string", "struct", "subprocess", "sys", "sysconfig", "tarfile",
        "tempfile", "termios", "textwrap", "threading", "time", "timeit", "tokenize",
        "traceback", "types", "typing", "unicodedata", "urllib", "urllib.parse", "uuid",
        "warnings", "weakref", "xml", "xmlrpc", "zipfile", "zipimport", "zlib",
    ];
    const BUNDLED: &[&str] = &[
        "click", "flask", "jinja2", "lxml", "markupsafe", "numpy", "pytz", "requests",
        "simplejson", "six", "werkzeug",
    ];
    let mut ignore = BTreeMap::new();
    for name in STDLIB {
        ignore.insert(name.to_string(), "Python standard library".to_string());
    }
    for name in BUNDLED {
        ignore.insert(
            name.to_string(),
            "Bundled third-party package".to_string(),
        );
    }
    ignore
}
