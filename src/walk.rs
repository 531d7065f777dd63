//! The reflective walker: a streaming, cycle-safe traversal of the
//! session's namespace graph.
//!
//! Modules are scheduled breadth-first through an explicit FIFO queue: a
//! nested module discovered while scanning the current module's members is
//! deferred until the current module's direct items are fully emitted. This
//! keeps the stream strictly alternating (one module marker, then all of
//! that module's items, then the next marker), which is what lets the
//! writer finalize each module's count and status without buffering.
//! Classes, by contrast, are walked depth-first inline; their member counts
//! are small and bounded, module graphs are not.
//!
//! Cycle safety is by object identity, not name: the same module or class
//! is frequently reachable under several names, and each distinct object is
//! emitted exactly once.

use std::collections::{BTreeMap, HashSet, VecDeque};

use anyhow::Result;

use crate::host::{Host, ObjId, ObjectInfo};
use crate::model::{Emit, EntityKind, ModuleRecord, ReflectedEntity};

/// Consumer of the emitted stream.
pub type Sink<'a> = dyn FnMut(Emit) -> Result<()> + 'a;

pub struct Walker {
    ignore: BTreeMap<String, String>,
    done: HashSet<String>,
    seen: HashSet<ObjId>,
    queued: HashSet<ObjId>,
    queue: VecDeque<(ReflectedEntity, ObjId)>,
}

impl Walker {
    pub fn new(ignore: &BTreeMap<String, String>, done: &HashSet<String>) -> Self {
        Self {
            ignore: ignore.clone(),
            done: done.clone(),
            seen: HashSet::new(),
            queued: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    /// Walk one import root and everything reachable from it that has not
    /// been visited yet, draining the nested-module queue before returning.
    pub fn walk_root<H: Host>(&mut self, host: &H, root: ObjId, sink: &mut Sink<'_>) -> Result<()> {
        self.walk_module(host, root, None, sink)?;
        while let Some((parent, module)) = self.queue.pop_front() {
            self.walk_module(host, module, Some(&parent), sink)?;
        }
        Ok(())
    }

    fn walk_module<H: Host>(
        &mut self,
        host: &H,
        module: ObjId,
        parent: Option<&ReflectedEntity>,
        sink: &mut Sink<'_>,
    ) -> Result<()> {
        if self.seen.contains(&module) {
            return Ok(());
        }
        self.seen.insert(module);
        let info = host.info(module);
        if info.flags.is_stub {
            return Ok(());
        }
        let name = object_name(&info);
        if self.done.contains(&name) {
            return Ok(());
        }
        let file = info
            .file
            .as_ref()
            .map(|f| f.canonicalize().unwrap_or_else(|_| f.clone()));
        if let Some(reason) = self.ignore.get(&name) {
            sink(Emit::Module(ModuleRecord::ignored(
                name,
                file,
                reason.clone(),
            )))?;
            return Ok(());
        }

        sink(Emit::Module(ModuleRecord::opened(&name, file)))?;
        let module_entity = make_entity(&info, EntityKind::Module, parent, Some(&name));
        sink(Emit::Entity(module_entity.clone()))?;

        for (member_name, member) in members_safe(host, module) {
            if member_name.starts_with('_') {
                continue;
            }
            let minfo = host.info(member);
            let f = minfo.flags;
            if f.is_module && !f.is_stub {
                self.enqueue(&module_entity, member);
            } else if f.is_class {
                self.walk_class(host, member, &module_entity, None, sink)?;
            } else if f.is_function {
                sink(entity(&minfo, EntityKind::Function, &module_entity, &member_name))?;
            } else if f.is_enum_member || f.is_host_enum_value {
                sink(entity(&minfo, EntityKind::Enum, &module_entity, &member_name))?;
            } else if f.is_bound_method || f.is_method_descriptor || f.is_builtin_callable {
                // Extracted directly off a module there is no enclosing
                // class, so it's just another callable.
                sink(entity(&minfo, EntityKind::Function, &module_entity, &member_name))?;
            } else {
                sink(entity(&minfo, EntityKind::Object, &module_entity, &member_name))?;
            }
        }
        Ok(())
    }

    fn walk_class<H: Host>(
        &mut self,
        host: &H,
        class: ObjId,
        parent: &ReflectedEntity,
        name_override: Option<String>,
        sink: &mut Sink<'_>,
    ) -> Result<()> {
        if self.seen.contains(&class) {
            return Ok(());
        }
        self.seen.insert(class);
        let info = host.info(class);
        let name = name_override.unwrap_or_else(|| object_name(&info));
        if name.starts_with('_') {
            return Ok(());
        }

        let kind = if info.flags.is_enum_subclass {
            EntityKind::Enum
        } else if self.is_host_enum_type(host, class) {
            EntityKind::EnumType
        } else {
            EntityKind::Class
        };
        let class_entity = make_entity(&info, kind, Some(parent), Some(&name));
        sink(Emit::Entity(class_entity.clone()))?;

        for (member_name, member) in members_safe(host, class) {
            if member_name.starts_with('_') {
                continue;
            }
            let minfo = host.info(member);
            let f = minfo.flags;
            if f.is_module && !f.is_stub {
                self.enqueue(&class_entity, member);
            } else if f.is_class {
                self.walk_class(
                    host,
                    member,
                    &class_entity,
                    Some(format!("{name}.{member_name}")),
                    sink,
                )?;
            } else if f.is_property {
                sink(entity(&minfo, EntityKind::Attribute, &class_entity, &member_name))?;
            } else {
                let kind = if f.is_bound_method {
                    EntityKind::Method
                } else if f.is_function || f.is_method_descriptor || f.is_builtin_callable {
                    if class_entity.kind == EntityKind::Class {
                        EntityKind::Method
                    } else {
                        EntityKind::Function
                    }
                } else if f.is_data_descriptor {
                    EntityKind::Attribute
                } else {
                    EntityKind::Object
                };
                sink(entity(&minfo, kind, &class_entity, &member_name))?;
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, parent: &ReflectedEntity, module: ObjId) {
        if !self.seen.contains(&module) && self.queued.insert(module) {
            self.queue.push_back((parent.clone(), module));
        }
    }

    /// Enum-shaped class heuristic: at least one public non-`thisown` member
    /// is a host enum value, corroborated by the session's reference enum
    /// type showing the same shape (guards against an unrelated type that
    /// merely looks enum-shaped).
    fn is_host_enum_type<H: Host>(&self, host: &H, class: ObjId) -> bool {
        let looks_enum_shaped = members_safe(host, class)
            .iter()
            .filter(|(n, _)| !n.starts_with('_') && n != "thisown")
            .any(|(_, m)| host.info(*m).flags.is_host_enum_value);
        if !looks_enum_shaped {
            return false;
        }
        match host.reference_enum_type() {
            Some(reference) => members_safe(host, reference)
                .iter()
                .filter(|(n, _)| !n.starts_with('_') && n != "thisown")
                .all(|(_, m)| host.info(*m).flags.is_host_enum_value),
            None => false,
        }
    }
}

fn entity(
    info: &ObjectInfo,
    kind: EntityKind,
    parent: &ReflectedEntity,
    member_name: &str,
) -> Emit {
    Emit::Entity(make_entity(info, kind, Some(parent), Some(member_name)))
}

/// Build one entity record, applying the shared edge-case policies: method
/// promotion for functions enclosed by a class, the `EnumValue` name and
/// value-type special cases, tuple collapse, and doc suppression.
fn make_entity(
    info: &ObjectInfo,
    kind: EntityKind,
    parent: Option<&ReflectedEntity>,
    name: Option<&str>,
) -> ReflectedEntity {
    let name = name
        .map(str::to_string)
        .or_else(|| info.name.clone())
        .unwrap_or_else(|| format!("<{}>", info.type_name));
    let mut kind = kind;
    let mut value_type = normalize_type_name(&info.type_name);
    if kind == EntityKind::Function
        && parent.map(|p| p.kind == EntityKind::Class).unwrap_or(false)
    {
        kind = EntityKind::Method;
    }
    if name == "EnumValue" {
        // The enum-value wrapper type definition itself, not an instance.
        kind = EntityKind::Class;
    } else if value_type == "EnumValue" {
        kind = EntityKind::Enum;
        // Enum instances report their owning enum type rather than the
        // generic wrapper type.
        if let Some(p) = parent {
            value_type = p.value_type.clone();
        }
    }
    ReflectedEntity::new(name, kind, value_type, doc_of(info), parent)
}

/// Tuple-shaped runtime types of any concrete shape collapse to a single
/// marker so every arity and field-name combination does not become its own
/// type name in the schema.
fn normalize_type_name(type_name: &str) -> String {
    if type_name.contains("tuple") || type_name.contains("Tuple") {
        "tuple".to_string()
    } else {
        type_name.to_string()
    }
}

/// Doc string with templated boilerplate suppressed: a doc identical to the
/// doc of the value's own type carries no information.
fn doc_of(info: &ObjectInfo) -> Option<String> {
    let own = info.doc.as_deref()?;
    if own.is_empty() || Some(own) == info.type_doc.as_deref() {
        return None;
    }
    Some(own.to_string())
}

fn object_name(info: &ObjectInfo) -> String {
    info.name
        .clone()
        .unwrap_or_else(|| format!("<{}>", info.type_name))
}

fn members_safe<H: Host>(host: &H, obj: ObjId) -> Vec<(String, ObjId)> {
    match host.members(obj) {
        Ok(members) => members,
        Err(err) => {
            eprintln!("[houscan] Warning: failed to get members: {err}");
            Vec::new()
        }
    }
}
