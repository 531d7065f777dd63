//! The consumed interface to the host application's scripting session.
//!
//! The session is an opaque, partially-hostile data source: importing a
//! module runs arbitrary third-party code, enumeration can throw on native
//! wrapper objects, and objects may be reachable under several names. The
//! pipeline only ever talks to it through this trait; tests and the CLI use
//! the in-memory [`crate::session::SessionHost`].

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

/// Stable identity of one session object for the duration of a run.
///
/// Identity, not name: modules and classes are frequently exposed under
/// multiple names, and the walker's cycle detection keys off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub u64);

/// Structural capability probes for a session object.
///
/// The walker classifies objects by evaluating these in a fixed priority
/// order; the host only answers what the object *is*, never what kind of
/// row it becomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectFlags {
    pub is_module: bool,
    pub is_class: bool,
    /// Plain (unbound) function.
    pub is_function: bool,
    pub is_bound_method: bool,
    pub is_method_descriptor: bool,
    pub is_builtin_callable: bool,
    pub is_data_descriptor: bool,
    pub is_property: bool,
    /// Instance of the language-native enum base.
    pub is_enum_member: bool,
    /// Instance of the host application's enum-value wrapper type.
    pub is_host_enum_value: bool,
    /// Class subclassing either enum base.
    pub is_enum_subclass: bool,
    /// Permissive stand-in mounted by the safety shims; never walked.
    pub is_stub: bool,
}

/// Everything the pipeline reads off a single object.
#[derive(Debug, Clone, Default)]
pub struct ObjectInfo {
    /// The object's own name, when it has one.
    pub name: Option<String>,
    /// Runtime type name, e.g. `int`, `EnumValue`, `GeometryViewportTuple`.
    pub type_name: String,
    pub doc: Option<String>,
    /// Documentation string of the object's own type; used to suppress
    /// boilerplate docs inherited verbatim from the type.
    pub type_doc: Option<String>,
    /// Defining file for modules, when known.
    pub file: Option<PathBuf>,
    pub flags: ObjectFlags,
}

/// Why an import produced no module. Recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportFault {
    /// The import raised; carries the stringified exception.
    Raised(String),
    /// The module tried to terminate the process and the termination guard
    /// intercepted it.
    AttemptedExit,
    /// Importing the name yielded something that is not a module.
    NotAModule,
}

impl ImportFault {
    /// The message stored as the module's failure status.
    pub fn message(&self) -> String {
        match self {
            ImportFault::Raised(msg) => msg.clone(),
            ImportFault::AttemptedExit => "module attempted to exit".to_string(),
            ImportFault::NotAModule => "import did not produce a module".to_string(),
        }
    }
}

impl fmt::Display for ImportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// The host session surface the pipeline consumes.
pub trait Host {
    /// Import a dotted name, running its module-level code.
    fn import_module(&mut self, name: &str) -> Result<ObjId, ImportFault>;

    /// The session's live module registry: everything imported so far,
    /// including modules pulled in as side effects of other imports.
    fn loaded_modules(&mut self) -> Vec<(String, ObjId)>;

    fn info(&self, obj: ObjId) -> ObjectInfo;

    /// Named public-and-private members of an object. May fail for native
    /// wrapper objects; callers degrade to "no members".
    fn members(&self, obj: ObjId) -> Result<Vec<(String, ObjId)>>;

    /// Dotted paths of optional host subsystems absent in this session
    /// (headless UI bindings and the like) that need stand-ins mounted
    /// before third-party imports can succeed.
    fn missing_subsystems(&self) -> Vec<String>;

    /// Mount a permissive stand-in object at a dotted path.
    fn mount_stub(&mut self, dotted_path: &str) -> ObjId;

    fn unmount_stub(&mut self, dotted_path: &str);

    /// While enabled, process-termination attempts during import surface as
    /// [`ImportFault::AttemptedExit`] and shutdown-hook registrations are
    /// captured and discarded.
    fn set_termination_guard(&mut self, enabled: bool);

    /// The host's known reference enum type, if the session exposes one.
    /// The walker checks its enum-type heuristic against this type's member
    /// shape before classifying a class as an enum type.
    fn reference_enum_type(&self) -> Option<ObjId>;
}
