//! In-memory session graph implementing [`Host`].
//!
//! A `SessionHost` replays an exported host session: an object arena with
//! identity handles, an import table mapping dotted names to either an
//! object or a recorded fault, and the permissive stand-in stubs the safety
//! shims mount for absent subsystems. The CLI loads one from a JSON
//! snapshot produced by the host-side exporter; tests build graphs
//! programmatically with the same API.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::host::{Host, ImportFault, ObjId, ObjectFlags, ObjectInfo};

/// Structural shape of a session object, the snapshot-level encoding of
/// [`ObjectFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Module,
    Class,
    /// Class subclassing a native or host enum base.
    EnumClass,
    Function,
    BoundMethod,
    MethodDescriptor,
    Builtin,
    DataDescriptor,
    Property,
    /// Instance of the language-native enum base.
    EnumMember,
    /// Instance of the host's enum-value wrapper type.
    HostEnumValue,
    Object,
}

impl Shape {
    fn flags(self) -> ObjectFlags {
        let mut f = ObjectFlags::default();
        match self {
            Shape::Module => f.is_module = true,
            Shape::Class => f.is_class = true,
            Shape::EnumClass => {
                f.is_class = true;
                f.is_enum_subclass = true;
            }
            Shape::Function => f.is_function = true,
            Shape::BoundMethod => f.is_bound_method = true,
            Shape::MethodDescriptor => f.is_method_descriptor = true,
            Shape::Builtin => f.is_builtin_callable = true,
            Shape::DataDescriptor => f.is_data_descriptor = true,
            Shape::Property => f.is_property = true,
            Shape::EnumMember => f.is_enum_member = true,
            Shape::HostEnumValue => f.is_host_enum_value = true,
            Shape::Object => {}
        }
        f
    }
}

#[derive(Debug, Clone)]
struct SessionObject {
    name: Option<String>,
    type_name: String,
    doc: Option<String>,
    type_doc: Option<String>,
    file: Option<PathBuf>,
    flags: ObjectFlags,
    members: Vec<(String, ObjId)>,
    /// Enumeration throws for this object (native wrapper behavior).
    members_fail: bool,
}

/// Recorded outcome of importing one dotted name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportEntry {
    /// Import succeeds and yields this object.
    Object(u64),
    /// Module-level code raises with this message.
    Raises(String),
    /// Module-level code attempts to terminate the process.
    AttemptsExit,
    /// The import machinery returns a non-module for this name.
    NotAModule(u64),
}

#[derive(Debug, Default)]
pub struct SessionHost {
    objects: Vec<SessionObject>,
    imports: HashMap<String, ImportEntry>,
    loaded: Vec<(String, ObjId)>,
    missing_subsystems: Vec<String>,
    stubs: HashMap<String, ObjId>,
    reference_enum: Option<ObjId>,
    termination_guard: bool,
    import_attempts: HashMap<String, u32>,
}

impl SessionHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a session snapshot exported by the host-side exporter.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session snapshot: {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed session snapshot: {}", path.display()))?;
        snapshot.into_host()
    }

    fn push(&mut self, obj: SessionObject) -> ObjId {
        let id = ObjId(self.objects.len() as u64);
        self.objects.push(obj);
        id
    }

    /// Add an object with an explicit shape and runtime type name.
    pub fn add_object(
        &mut self,
        name: Option<&str>,
        type_name: &str,
        shape: Shape,
        doc: Option<&str>,
    ) -> ObjId {
        self.push(SessionObject {
            name: name.map(str::to_string),
            type_name: type_name.to_string(),
            doc: doc.map(str::to_string),
            type_doc: None,
            file: None,
            flags: shape.flags(),
            members: Vec::new(),
            members_fail: false,
        })
    }

    /// A module object registered under its dotted name.
    pub fn module(&mut self, name: &str, file: Option<&str>) -> ObjId {
        let id = self.add_object(Some(name), "module", Shape::Module, None);
        self.objects[id.0 as usize].file = file.map(PathBuf::from);
        self.imports
            .insert(name.to_string(), ImportEntry::Object(id.0));
        id
    }

    pub fn class(&mut self, name: &str, doc: Option<&str>) -> ObjId {
        self.add_object(Some(name), "type", Shape::Class, doc)
    }

    pub fn function(&mut self, name: &str, doc: Option<&str>) -> ObjId {
        self.add_object(Some(name), "function", Shape::Function, doc)
    }

    pub fn add_member(&mut self, parent: ObjId, name: &str, child: ObjId) {
        self.objects[parent.0 as usize]
            .members
            .push((name.to_string(), child));
    }

    pub fn set_doc(&mut self, obj: ObjId, doc: Option<&str>, type_doc: Option<&str>) {
        let o = &mut self.objects[obj.0 as usize];
        o.doc = doc.map(str::to_string);
        o.type_doc = type_doc.map(str::to_string);
    }

    pub fn set_type_name(&mut self, obj: ObjId, type_name: &str) {
        self.objects[obj.0 as usize].type_name = type_name.to_string();
    }

    /// Make enumeration of this object's members throw.
    pub fn fail_members(&mut self, obj: ObjId) {
        self.objects[obj.0 as usize].members_fail = true;
    }

    pub fn register_import(&mut self, name: &str, entry: ImportEntry) {
        self.imports.insert(name.to_string(), entry);
    }

    pub fn set_missing_subsystems(&mut self, paths: &[&str]) {
        self.missing_subsystems = paths.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_reference_enum(&mut self, obj: ObjId) {
        self.reference_enum = Some(obj);
    }

    /// How many times an import of `name` was attempted (spy for tests).
    pub fn import_attempts(&self, name: &str) -> u32 {
        self.import_attempts.get(name).copied().unwrap_or(0)
    }

    pub fn termination_guard(&self) -> bool {
        self.termination_guard
    }

    pub fn mounted_stubs(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.stubs.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Host for SessionHost {
    fn import_module(&mut self, name: &str) -> Result<ObjId, ImportFault> {
        *self.import_attempts.entry(name.to_string()).or_insert(0) += 1;
        if let Some(stub) = self.stubs.get(name) {
            return Ok(*stub);
        }
        let entry = self
            .imports
            .get(name)
            .cloned()
            .ok_or_else(|| ImportFault::Raised(format!("No module named '{name}'")))?;
        match entry {
            ImportEntry::Object(idx) => {
                let id = ObjId(idx);
                if !self.loaded.iter().any(|(_, o)| *o == id) {
                    self.loaded.push((name.to_string(), id));
                }
                Ok(id)
            }
            ImportEntry::Raises(msg) => Err(ImportFault::Raised(msg)),
            ImportEntry::AttemptsExit => {
                if self.termination_guard {
                    Err(ImportFault::AttemptedExit)
                } else {
                    Err(ImportFault::Raised("SystemExit".to_string()))
                }
            }
            ImportEntry::NotAModule(_) => Err(ImportFault::NotAModule),
        }
    }

    fn loaded_modules(&mut self) -> Vec<(String, ObjId)> {
        self.loaded.clone()
    }

    fn info(&self, obj: ObjId) -> ObjectInfo {
        let o = &self.objects[obj.0 as usize];
        ObjectInfo {
            name: o.name.clone(),
            type_name: o.type_name.clone(),
            doc: o.doc.clone(),
            type_doc: o.type_doc.clone(),
            file: o.file.clone(),
            flags: o.flags,
        }
    }

    fn members(&self, obj: ObjId) -> Result<Vec<(String, ObjId)>> {
        let o = &self.objects[obj.0 as usize];
        if o.members_fail {
            return Err(anyhow!(
                "enumeration raised for {}",
                o.name.as_deref().unwrap_or("<anonymous>")
            ));
        }
        Ok(o.members.clone())
    }

    fn missing_subsystems(&self) -> Vec<String> {
        self.missing_subsystems.clone()
    }

    fn mount_stub(&mut self, dotted_path: &str) -> ObjId {
        if let Some(existing) = self.stubs.get(dotted_path) {
            return *existing;
        }
        let mut flags = ObjectFlags::default();
        flags.is_stub = true;
        let id = self.push(SessionObject {
            name: Some(dotted_path.to_string()),
            type_name: "InfiniteStub".to_string(),
            doc: None,
            type_doc: None,
            file: None,
            flags,
            members: Vec::new(),
            members_fail: false,
        });
        self.stubs.insert(dotted_path.to_string(), id);
        id
    }

    fn unmount_stub(&mut self, dotted_path: &str) {
        self.stubs.remove(dotted_path);
    }

    fn set_termination_guard(&mut self, enabled: bool) {
        self.termination_guard = enabled;
    }

    fn reference_enum_type(&self) -> Option<ObjId> {
        self.reference_enum
    }
}

/// Serialized form of a session graph.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub missing_subsystems: Vec<String>,
    /// Index of the reference enum type object, when the session has one.
    #[serde(default)]
    pub reference_enum: Option<u64>,
    pub objects: Vec<SnapshotObject>,
    pub imports: HashMap<String, ImportEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotObject {
    #[serde(default)]
    pub name: Option<String>,
    pub type_name: String,
    pub shape: Shape,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub type_doc: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Pairs of member name and object index.
    #[serde(default)]
    pub members: Vec<(String, u64)>,
    #[serde(default)]
    pub members_fail: bool,
}

impl Snapshot {
    fn into_host(self) -> Result<SessionHost> {
        let count = self.objects.len() as u64;
        let check = |idx: u64| -> Result<ObjId> {
            if idx >= count {
                return Err(anyhow!("snapshot references unknown object {idx}"));
            }
            Ok(ObjId(idx))
        };

        let mut host = SessionHost::new();
        for obj in &self.objects {
            let mut members = Vec::with_capacity(obj.members.len());
            for (name, idx) in &obj.members {
                members.push((name.clone(), check(*idx)?));
            }
            host.objects.push(SessionObject {
                name: obj.name.clone(),
                type_name: obj.type_name.clone(),
                doc: obj.doc.clone(),
                type_doc: obj.type_doc.clone(),
                file: obj.file.clone(),
                flags: obj.shape.flags(),
                members,
                members_fail: obj.members_fail,
            });
        }
        for (name, entry) in self.imports {
            match entry {
                ImportEntry::Object(idx) | ImportEntry::NotAModule(idx) => {
                    check(idx)?;
                }
                _ => {}
            }
            host.imports.insert(name, entry);
        }
        host.missing_subsystems = self.missing_subsystems;
        host.reference_enum = match self.reference_enum {
            Some(idx) => Some(check(idx)?),
            None => None,
        };
        Ok(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_records_attempts_and_loads_once() {
        let mut host = SessionHost::new();
        let m = host.module("pkg", Some("/lib/pkg/__init__.py"));
        assert_eq!(host.import_module("pkg"), Ok(m));
        assert_eq!(host.import_module("pkg"), Ok(m));
        assert_eq!(host.import_attempts("pkg"), 2);
        assert_eq!(host.loaded_modules().len(), 1);
    }

    #[test]
    fn exit_attempt_is_a_fault_only_under_the_guard() {
        let mut host = SessionHost::new();
        host.register_import("exiter", ImportEntry::AttemptsExit);
        host.set_termination_guard(true);
        assert_eq!(
            host.import_module("exiter"),
            Err(ImportFault::AttemptedExit)
        );
        host.set_termination_guard(false);
        assert_eq!(
            host.import_module("exiter"),
            Err(ImportFault::Raised("SystemExit".to_string()))
        );
    }

    #[test]
    fn mounted_stub_shadows_the_import_table() {
        let mut host = SessionHost::new();
        host.register_import("hdefereval", ImportEntry::Raises("headless".to_string()));
        let stub = host.mount_stub("hdefereval");
        assert!(host.info(stub).flags.is_stub);
        assert_eq!(host.import_module("hdefereval"), Ok(stub));
        host.unmount_stub("hdefereval");
        assert!(host.import_module("hdefereval").is_err());
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = Snapshot {
            missing_subsystems: vec!["hou.ui".to_string()],
            reference_enum: None,
            objects: vec![SnapshotObject {
                name: Some("toolutils".to_string()),
                type_name: "module".to_string(),
                shape: Shape::Module,
                doc: Some("Tool helpers.".to_string()),
                type_doc: None,
                file: Some(PathBuf::from("/hfs/houdini/python3.11libs/toolutils.py")),
                members: vec![],
                members_fail: false,
            }],
            imports: HashMap::from([(
                "toolutils".to_string(),
                ImportEntry::Object(0),
            )]),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        let mut host = parsed.into_host().unwrap();
        let id = host.import_module("toolutils").unwrap();
        assert_eq!(host.info(id).doc.as_deref(), Some("Tool helpers."));
    }

    #[test]
    fn snapshot_rejects_dangling_member_references() {
        let snapshot = Snapshot {
            missing_subsystems: vec![],
            reference_enum: None,
            objects: vec![SnapshotObject {
                name: Some("m".to_string()),
                type_name: "module".to_string(),
                shape: Shape::Module,
                doc: None,
                type_doc: None,
                file: None,
                members: vec![("ghost".to_string(), 7)],
                members_fail: false,
            }],
            imports: HashMap::new(),
        };
        assert!(snapshot.into_host().is_err());
    }
}
