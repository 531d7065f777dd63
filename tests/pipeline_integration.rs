use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use houscan::db::AnalysisDb;
use houscan::host::{Host, ImportFault, ObjId, ObjectInfo};
use houscan::pipeline::{run, CrawlConfig};
use houscan::session::{ImportEntry, SessionHost};
use rusqlite::Connection;

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "houscan_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "").unwrap();
}

/// A search-path tree holding the `pkg` package with one submodule.
fn demo_tree(root: &Path) {
    touch(&root.join("pkg/__init__.py"));
    touch(&root.join("pkg/sub.py"));
}

/// Session graph matching [`demo_tree`]: `pkg.sub` holds a function and a
/// class with one method; `pkg` re-exports the submodule.
fn demo_host(root: &Path) -> SessionHost {
    let mut host = SessionHost::new();
    let init = root.join("pkg/__init__.py");
    let sub_file = root.join("pkg/sub.py");
    let pkg = host.module("pkg", init.to_str());
    let sub = host.module("pkg.sub", sub_file.to_str());
    let f = host.function("process", Some("Process one node."));
    let class = host.class("Exporter", Some("Writes geometry."));
    let method = host.function("save", None);
    host.add_member(sub, "process", f);
    host.add_member(sub, "Exporter", class);
    host.add_member(class, "save", method);
    host.add_member(pkg, "sub", sub);
    host
}

fn config(root: &Path) -> CrawlConfig {
    CrawlConfig {
        search_paths: vec![root.to_path_buf()],
        ignore: BTreeMap::new(),
        exclude_prefix: None,
        force: vec![],
    }
}

fn query_one<T: rusqlite::types::FromSql>(conn: &Connection, sql: &str) -> T {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn crawl_persists_the_reflected_graph() {
    let root = temp_dir("graph");
    demo_tree(&root);
    let db_path = root.join("out.db");

    let mut host = demo_host(&root);
    let mut db = AnalysisDb::open(&db_path).unwrap();
    let summary = run(&mut host, &config(&root), &mut db).unwrap();
    drop(db);

    assert_eq!(summary.modules_opened, 2);
    assert_eq!(summary.modules_failed, 0);

    let conn = Connection::open(&db_path).unwrap();
    // pkg.sub: its own module entity, the function, the class, the method.
    let (count, status): (i64, String) = conn
        .query_row(
            "SELECT count, status FROM modules WHERE name = 'pkg.sub'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(count, 4);
    assert_eq!(status, "OK");

    let kind: String = conn
        .query_row(
            "SELECT kind FROM module_data WHERE name = 'save'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(kind, "method");
    let doc: String = conn
        .query_row(
            "SELECT doc FROM module_data WHERE name = 'process'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(doc, "Process one node.");

    // Every parented row points at an existing row.
    let orphans: i64 = query_one(
        &conn,
        "SELECT COUNT(*) FROM module_data md
         WHERE md.parent_name IS NOT NULL
           AND NOT EXISTS (
             SELECT 1 FROM module_data p
             WHERE p.name = md.parent_name AND p.kind = md.parent_kind)",
    );
    assert_eq!(orphans, 0);

    std::fs::remove_dir_all(root).unwrap();
}

#[test]
fn failing_imports_become_failure_rows_not_aborts() {
    let root = temp_dir("faults");
    touch(&root.join("broken.py"));
    touch(&root.join("exiter.py"));
    demo_tree(&root);
    let db_path = root.join("out.db");

    let mut host = demo_host(&root);
    host.register_import("broken", ImportEntry::Raises("boom".to_string()));
    host.register_import("exiter", ImportEntry::AttemptsExit);

    let mut db = AnalysisDb::open(&db_path).unwrap();
    let summary = run(&mut host, &config(&root), &mut db).unwrap();
    drop(db);

    assert_eq!(summary.modules_failed, 2);
    assert_eq!(summary.modules_opened, 2);

    let conn = Connection::open(&db_path).unwrap();
    let (status, reason): (String, String) = conn
        .query_row(
            "SELECT status, reason FROM modules WHERE name = 'broken'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(status, "boom");
    assert_eq!(reason, "boom");
    let status: String = conn
        .query_row(
            "SELECT status FROM modules WHERE name = 'exiter'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "module attempted to exit");
    // No entities were stored for either failure.
    let rows: i64 = query_one(
        &conn,
        "SELECT COUNT(*) FROM module_data WHERE name IN ('broken', 'exiter')",
    );
    assert_eq!(rows, 0);

    std::fs::remove_dir_all(root).unwrap();
}

#[test]
fn ignored_modules_are_recorded_but_never_imported() {
    let root = temp_dir("ignore");
    touch(&root.join("badboy.py"));
    let db_path = root.join("out.db");

    let mut host = SessionHost::new();
    host.module("badboy", root.join("badboy.py").to_str());

    let mut cfg = config(&root);
    cfg.ignore.insert(
        "badboy".to_string(),
        "Hangs the session on import".to_string(),
    );

    let mut db = AnalysisDb::open(&db_path).unwrap();
    let summary = run(&mut host, &cfg, &mut db).unwrap();
    drop(db);

    assert_eq!(summary.modules_ignored, 1);
    assert_eq!(host.import_attempts("badboy"), 0);

    let conn = Connection::open(&db_path).unwrap();
    let (status, reason): (String, String) = conn
        .query_row(
            "SELECT status, reason FROM modules WHERE name = 'badboy'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(status, "IGNORE");
    assert_eq!(reason, "Hangs the session on import");

    std::fs::remove_dir_all(root).unwrap();
}

#[test]
fn second_run_resumes_without_reimporting() {
    let root = temp_dir("resume");
    demo_tree(&root);
    let db_path = root.join("out.db");

    let mut first = demo_host(&root);
    let mut db = AnalysisDb::open(&db_path).unwrap();
    run(&mut first, &config(&root), &mut db).unwrap();
    drop(db);

    let conn = Connection::open(&db_path).unwrap();
    let modules_before: i64 = query_one(&conn, "SELECT COUNT(*) FROM modules");
    let entities_before: i64 = query_one(&conn, "SELECT COUNT(*) FROM module_data");
    drop(conn);

    let mut second = demo_host(&root);
    let mut db = AnalysisDb::open(&db_path).unwrap();
    let summary = run(&mut second, &config(&root), &mut db).unwrap();
    drop(db);

    assert_eq!(summary.skipped_done, 2);
    assert_eq!(summary.modules_opened, 0);
    assert_eq!(second.import_attempts("pkg.sub"), 0);
    assert_eq!(second.import_attempts("pkg"), 0);

    let conn = Connection::open(&db_path).unwrap();
    assert_eq!(
        query_one::<i64>(&conn, "SELECT COUNT(*) FROM modules"),
        modules_before
    );
    assert_eq!(
        query_one::<i64>(&conn, "SELECT COUNT(*) FROM module_data"),
        entities_before
    );

    std::fs::remove_dir_all(root).unwrap();
}

#[test]
fn forced_modules_are_recrawled_and_rows_replaced() {
    let root = temp_dir("force");
    demo_tree(&root);
    let db_path = root.join("out.db");

    for _ in 0..2 {
        let mut host = demo_host(&root);
        let mut cfg = config(&root);
        cfg.force = vec!["pkg".to_string(), "pkg.sub".to_string()];
        let mut db = AnalysisDb::open(&db_path).unwrap();
        let summary = run(&mut host, &cfg, &mut db).unwrap();
        drop(db);
        assert_eq!(summary.modules_opened, 2);
        assert_eq!(host.import_attempts("pkg.sub"), 1);
    }

    let conn = Connection::open(&db_path).unwrap();
    // Primary keys replaced rows instead of duplicating them.
    assert_eq!(query_one::<i64>(&conn, "SELECT COUNT(*) FROM modules"), 2);
    let dupes: i64 = query_one(
        &conn,
        "SELECT COUNT(*) FROM (SELECT name, kind FROM module_data
          GROUP BY name, kind HAVING COUNT(*) > 1)",
    );
    assert_eq!(dupes, 0);

    std::fs::remove_dir_all(root).unwrap();
}

/// Delegating host that drops a new module file onto disk when a chosen
/// module is imported. Whether that file is then crawled tells us whether
/// discovery runs interleaved with imports or was enumerated up front.
struct WritesFileOnImport {
    inner: SessionHost,
    trigger: String,
    creates: PathBuf,
}

impl Host for WritesFileOnImport {
    fn import_module(&mut self, name: &str) -> Result<ObjId, ImportFault> {
        if name == self.trigger {
            touch(&self.creates);
        }
        self.inner.import_module(name)
    }

    fn loaded_modules(&mut self) -> Vec<(String, ObjId)> {
        self.inner.loaded_modules()
    }

    fn info(&self, obj: ObjId) -> ObjectInfo {
        self.inner.info(obj)
    }

    fn members(&self, obj: ObjId) -> anyhow::Result<Vec<(String, ObjId)>> {
        self.inner.members(obj)
    }

    fn missing_subsystems(&self) -> Vec<String> {
        self.inner.missing_subsystems()
    }

    fn mount_stub(&mut self, dotted_path: &str) -> ObjId {
        self.inner.mount_stub(dotted_path)
    }

    fn unmount_stub(&mut self, dotted_path: &str) {
        self.inner.unmount_stub(dotted_path)
    }

    fn set_termination_guard(&mut self, enabled: bool) {
        self.inner.set_termination_guard(enabled)
    }

    fn reference_enum_type(&self) -> Option<ObjId> {
        self.inner.reference_enum_type()
    }
}

#[test]
fn discovery_stays_interleaved_with_imports() {
    let first_root = temp_dir("lazy_a");
    let second_root = temp_dir("lazy_b");
    touch(&first_root.join("first.py"));
    let late_file = second_root.join("late.py");
    let db_path = first_root.join("out.db");

    let mut inner = SessionHost::new();
    inner.module("first", first_root.join("first.py").to_str());
    inner.module("late", late_file.to_str());
    let mut host = WritesFileOnImport {
        inner,
        trigger: "first".to_string(),
        creates: late_file,
    };

    let mut cfg = config(&first_root);
    cfg.search_paths = vec![first_root.clone(), second_root.clone()];
    let mut db = AnalysisDb::open(&db_path).unwrap();
    let summary = run(&mut host, &cfg, &mut db).unwrap();
    drop(db);

    // A module that only came into existence after the crawl started was
    // still found, so the second root was not enumerated up front.
    assert_eq!(summary.modules_opened, 2);
    let conn = Connection::open(&db_path).unwrap();
    let status: String =
        query_one(&conn, "SELECT status FROM modules WHERE name = 'late'");
    assert_eq!(status, "OK");

    std::fs::remove_dir_all(first_root).unwrap();
    std::fs::remove_dir_all(second_root).unwrap();
}
