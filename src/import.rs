//! Guarded dynamic import.
//!
//! Importing a candidate runs arbitrary third-party module-level code, so
//! every attempt happens under the full shim set and every failure mode is
//! converted into a [`ModuleRecord`] instead of propagating. The pipeline
//! never aborts because one module misbehaved.

use std::path::Path;

use crate::host::{Host, ImportFault, ObjId};
use crate::model::ModuleRecord;
use crate::shim::with_shims;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(ObjId),
    Failed(ModuleRecord),
}

/// Import `name` under the safety shims, reducing any fault to a failure
/// record. `file` is the origin the candidate was discovered from; used for
/// bookkeeping when the import itself yields nothing.
pub fn import_guarded<H: Host>(host: &mut H, name: &str, file: Option<&Path>) -> ImportOutcome {
    eprintln!("[houscan] Importing {name}...");
    let result = with_shims(host, |h| h.import_module(name));
    match result {
        Ok(Ok(obj)) => {
            // Whatever arrived must actually be a module; import hooks can
            // hand back arbitrary objects.
            let flags = host.info(obj).flags;
            if flags.is_module || flags.is_stub {
                ImportOutcome::Imported(obj)
            } else {
                fail(name, file, ImportFault::NotAModule)
            }
        }
        Ok(Err(fault)) => fail(name, file, fault),
        // Shim installation itself failed; treat like an import fault so
        // the run continues.
        Err(err) => fail(name, file, ImportFault::Raised(err.to_string())),
    }
}

fn fail(name: &str, file: Option<&Path>, fault: ImportFault) -> ImportOutcome {
    match &fault {
        ImportFault::AttemptedExit => {
            eprintln!("[houscan] Warning: module {name} attempted to exit, skipping");
        }
        other => {
            eprintln!("[houscan] Warning: failed to import {name}: {other}");
        }
    }
    ImportOutcome::Failed(ModuleRecord::failed(
        name,
        file.map(|f| f.to_path_buf()),
        fault.message(),
    ))
}
