use anyhow::{Context, Result};
use clap::Parser;
use houscan::cli::{Cli, Commands};
use houscan::db::AnalysisDb;
use houscan::hfs::{
    default_db_path, default_ignore, find_installations, install_at, select_installation,
    HoudiniInstall,
};
use houscan::pipeline::{run, CrawlConfig};
use houscan::session::SessionHost;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.clone() {
        Commands::Clear => {
            let db_path = resolve_db_path(&cli, None)?;
            let db = AnalysisDb::open(&db_path)?;
            db.clear()?;
            db.vacuum()?;
            eprintln!("[houscan] Cleared {}", db_path.display());
        }
        Commands::Stats => {
            let db_path = resolve_db_path(&cli, None)?;
            let db = AnalysisDb::open(&db_path)?;
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Crawl {
            session,
            hfs,
            houdini_version,
            paths,
            force,
        } => {
            let mut host = SessionHost::load(&session)?;
            let install = resolve_installation(hfs.as_deref(), houdini_version.as_deref())?;
            let db_path = match cli.db.clone() {
                Some(p) => p,
                None => default_db_path(&install.version)?,
            };
            let config = crawl_config(&install, paths, force);
            let mut db = AnalysisDb::open(&db_path)?;
            let summary = run(&mut host, &config, &mut db)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn resolve_installation(
    hfs: Option<&Path>,
    houdini_version: Option<&str>,
) -> Result<HoudiniInstall> {
    if let Some(dir) = hfs {
        return install_at(dir)
            .with_context(|| format!("No usable Houdini installation at {}", dir.display()));
    }
    select_installation(find_installations(), houdini_version)
}

fn crawl_config(install: &HoudiniInstall, paths: Vec<PathBuf>, force: Vec<String>) -> CrawlConfig {
    let search_paths = if paths.is_empty() {
        install.search_paths.clone()
    } else {
        paths
    };
    CrawlConfig {
        search_paths,
        ignore: default_ignore(),
        // The interpreter's own standard library ships under the
        // installation's python/ tree.
        exclude_prefix: Some(install.hfs.join("python")),
        force,
    }
}

fn resolve_db_path(cli: &Cli, houdini_version: Option<&str>) -> Result<PathBuf> {
    if let Some(p) = cli.db.clone() {
        return Ok(p);
    }
    let install = select_installation(find_installations(), houdini_version)?;
    default_db_path(&install.version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_paths_replace_the_installations_search_paths() {
        let install = HoudiniInstall {
            version: "20.5.584".to_string(),
            hfs: PathBuf::from("/opt/hfs20.5.584"),
            hython: PathBuf::from("/opt/hfs20.5.584/bin/hython"),
            search_paths: vec![PathBuf::from("/opt/hfs20.5.584/houdini/python3.11libs")],
        };
        let config = crawl_config(&install, vec![PathBuf::from("/tmp/libs")], vec![]);
        assert_eq!(config.search_paths, vec![PathBuf::from("/tmp/libs")]);
        assert!(config.ignore.contains_key("sys"));

        let config = crawl_config(&install, vec![], vec!["hou".to_string()]);
        assert_eq!(config.search_paths, install.search_paths);
        assert_eq!(config.force, vec!["hou".to_string()]);
    }
}
