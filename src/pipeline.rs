//! The end-to-end crawl: discovery, guarded import, reflective walk,
//! persistence. Single-threaded and pull-based; at any moment only the
//! current module's items are in flight.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::db::AnalysisDb;
use crate::discover::{Discovered, Discovery};
use crate::host::Host;
use crate::import::{import_guarded, ImportOutcome};
use crate::model::Emit;
use crate::walk::Walker;

/// Everything a crawl needs besides the host and the database.
#[derive(Debug, Default)]
pub struct CrawlConfig {
    /// Search-path roots to enumerate for candidates.
    pub search_paths: Vec<PathBuf>,
    /// Module names rejected by policy, with a human-readable reason each.
    pub ignore: BTreeMap<String, String>,
    /// Discovery below this prefix is skipped (the interpreter's own
    /// standard library).
    pub exclude_prefix: Option<PathBuf>,
    /// Names that must be crawled even if a previous run stored them.
    pub force: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub modules_opened: u64,
    pub modules_failed: u64,
    pub modules_ignored: u64,
    pub entities: u64,
    pub skipped_done: usize,
}

/// Run one crawl to completion. Individual module failures are recorded
/// and skipped; only storage failures propagate.
pub fn run<H: Host>(host: &mut H, config: &CrawlConfig, db: &mut AnalysisDb) -> Result<RunSummary> {
    let mut done = db.stored_modules(true, false);
    for name in &config.force {
        done.remove(name);
    }
    let skipped_done = done.len();
    if skipped_done > 0 {
        eprintln!("[houscan] Resuming; {skipped_done} modules already stored");
    }

    let discovery = Discovery::new(
        &config.search_paths,
        &config.ignore,
        &done,
        config.exclude_prefix.as_deref(),
    );

    let mut walker = Walker::new(&config.ignore, &done);
    let mut writer = db.writer();
    let mut sink = |emit: Emit| writer.write(&emit);

    // Discovery stays an iterator: search paths hold thousands of modules
    // and nothing buffers beyond one directory's pending queue.
    for discovered in discovery {
        match discovered {
            Discovered::Ignored(record) => {
                sink(Emit::Module(record))?;
            }
            Discovered::Candidate { name, file } => {
                match import_guarded(host, &name, Some(&file)) {
                    ImportOutcome::Imported(obj) => {
                        walker.walk_root(host, obj, &mut sink)?;
                    }
                    ImportOutcome::Failed(record) => {
                        sink(Emit::Module(record))?;
                    }
                }
            }
        }
    }

    // Imports drag in modules discovery never saw (dependencies outside
    // the search paths). Sweep the live registry; already-walked entries
    // are no-ops.
    for (_, obj) in host.loaded_modules() {
        walker.walk_root(host, obj, &mut sink)?;
    }

    let totals = writer.finish()?;
    db.vacuum()?;
    Ok(RunSummary {
        modules_opened: totals.modules_opened,
        modules_failed: totals.modules_failed,
        modules_ignored: totals.modules_ignored,
        entities: totals.entities,
        skipped_done,
    })
}
