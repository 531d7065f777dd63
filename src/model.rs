//! Record types flowing through the analysis pipeline.
//!
//! The walker emits one flat stream of [`Emit`] values: a `Module` marker
//! opens bookkeeping for a module, and every `Entity` that follows belongs
//! to that module until the next marker arrives. Both record shapes are
//! exactly what lands in the database.

use std::fmt;
use std::path::PathBuf;

/// Closed taxonomy for reflected members.
///
/// `Constant` is part of the schema vocabulary but is never produced by the
/// walker; opaque values fall through to `Object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Module,
    Class,
    Function,
    Method,
    Enum,
    EnumType,
    Constant,
    Object,
    Attribute,
}

impl EntityKind {
    /// Text form stored in the `kind` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
            EntityKind::Enum => "enum",
            EntityKind::EnumType => "EnumType",
            EntityKind::Constant => "constant",
            EntityKind::Object => "object",
            EntityKind::Attribute => "attribute",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reflected member of the session's object graph.
///
/// Primary key is `(name, kind)`; re-runs replace earlier rows. Every
/// non-root entity carries the `(name, kind)` of its enclosing module or
/// class, which must already exist as a row of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedEntity {
    pub name: String,
    pub kind: EntityKind,
    pub value_type: String,
    pub doc: Option<String>,
    pub parent_name: Option<String>,
    pub parent_kind: Option<EntityKind>,
}

impl ReflectedEntity {
    pub fn new(
        name: impl Into<String>,
        kind: EntityKind,
        value_type: impl Into<String>,
        doc: Option<String>,
        parent: Option<&ReflectedEntity>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type: value_type.into(),
            doc,
            parent_name: parent.map(|p| p.name.clone()),
            parent_kind: parent.map(|p| p.kind),
        }
    }
}

/// Terminal state of a module's bookkeeping row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    /// All of the module's items were emitted.
    Ok,
    /// Name was in the ignore list; never imported.
    Ignore,
    /// Import or enumeration failed; carries the fault message.
    Failed(String),
}

impl ModuleStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ModuleStatus::Ok => "OK",
            ModuleStatus::Ignore => "IGNORE",
            ModuleStatus::Failed(msg) => msg,
        }
    }
}

/// Bookkeeping for one import root.
///
/// Created the moment a name is accepted for import, before the import is
/// attempted. `status: None` means the module is open and its items are
/// still streaming; the writer stamps the final count and status when the
/// next module arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    pub directory: Option<PathBuf>,
    pub file: Option<PathBuf>,
    pub item_count: Option<i64>,
    pub status: Option<ModuleStatus>,
    pub reason: Option<String>,
}

impl ModuleRecord {
    /// A freshly-opened module; directory derives from the file's parent.
    pub fn opened(name: impl Into<String>, file: Option<PathBuf>) -> Self {
        let directory = file.as_ref().and_then(|f| f.parent().map(PathBuf::from));
        Self {
            name: name.into(),
            directory,
            file,
            item_count: None,
            status: None,
            reason: None,
        }
    }

    pub fn ignored(
        name: impl Into<String>,
        file: Option<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        let mut rec = Self::opened(name, file);
        rec.status = Some(ModuleStatus::Ignore);
        rec.reason = Some(reason.into());
        rec
    }

    /// A failed import; the fault message doubles as the reason.
    pub fn failed(name: impl Into<String>, file: Option<PathBuf>, message: String) -> Self {
        let mut rec = Self::opened(name, file);
        rec.reason = Some(message.clone());
        rec.status = Some(ModuleStatus::Failed(message));
        rec
    }

    /// Whether this record still awaits items (freshly opened).
    pub fn is_open(&self) -> bool {
        self.status.is_none()
    }
}

/// One item of the walker's output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    Module(ModuleRecord),
    Entity(ReflectedEntity),
}
