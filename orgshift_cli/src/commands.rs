//! Command wiring: build the connector, store, and engine, then dispatch.

use anyhow::Context;
use orgshift_core::migrate::export::export_all;
use orgshift_core::migrate::metadata::MetadataCache;
use orgshift_core::snapshot::csv_store::CsvSnapshotStore;
use orgshift_core::snapshot;
use orgshift_core::{MigrationConfig, MigrationEngine, ObjectType, Platform, RunMode, RunReport};
use orgshift_integrations::{SalesforceConfig, SalesforceRestClient};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MigrationConfig> {
    match path {
        Some(p) => MigrationConfig::from_yaml_file(p)
            .with_context(|| format!("loading config from {}", p.display())),
        None => Ok(MigrationConfig::default()),
    }
}

async fn connect() -> anyhow::Result<Arc<SalesforceRestClient>> {
    let cfg = SalesforceConfig::from_env().context("reading salesforce credentials from env")?;
    let client = SalesforceRestClient::connect(&cfg)
        .await
        .context("connecting to salesforce")?;
    Ok(Arc::new(client))
}

fn print_run_report(report: &RunReport) {
    for o in &report.objects {
        match &o.skipped {
            Some(reason) => println!("{}: skipped ({reason})", o.object),
            None => println!(
                "{}: loaded {}, submitted {}, created {}, failed {}",
                o.object, o.loaded, o.submitted, o.created, o.failed
            ),
        }
    }
    for r in &report.reconciliation {
        match &r.skipped {
            Some(reason) => println!("{}: reconcile skipped ({reason})", r.object),
            None => println!(
                "{}: reconcile queued {}, applied {}, failed {}",
                r.object, r.queued, r.applied, r.failed
            ),
        }
    }
    println!("run {} complete", report.run_id);
}

pub async fn run(
    object: Option<String>,
    data_dir: &Path,
    config: Option<PathBuf>,
    skip_reconcile: bool,
) -> anyhow::Result<()> {
    let cfg = load_config(config.as_ref())?;
    let platform = connect().await?;
    let store = Arc::new(CsvSnapshotStore::new(data_dir));
    let engine = MigrationEngine::new(platform, store, cfg)?;

    let mode = match object {
        Some(name) => RunMode::Object(ObjectType::new(name)),
        None => RunMode::All {
            reconcile: !skip_reconcile,
        },
    };
    let report = engine.run(mode).await?;
    print_run_report(&report);
    Ok(())
}

pub async fn reconcile(data_dir: &Path, config: Option<PathBuf>) -> anyhow::Result<()> {
    let cfg = load_config(config.as_ref())?;
    let platform = connect().await?;
    let store = Arc::new(CsvSnapshotStore::new(data_dir));
    let engine = MigrationEngine::new(platform, store, cfg)?;

    let report = engine.run(RunMode::ReconcileOnly).await?;
    print_run_report(&report);
    Ok(())
}

pub async fn export(data_dir: &Path, config: Option<PathBuf>) -> anyhow::Result<()> {
    let cfg = load_config(config.as_ref())?;
    let platform = connect().await?;
    let store = CsvSnapshotStore::new(data_dir);
    let metadata = MetadataCache::new(platform.clone());

    let reports = export_all(platform.as_ref(), &metadata, &store, &cfg).await?;
    for r in &reports {
        match &r.skipped {
            Some(reason) => println!("{}: skipped ({reason})", r.object),
            None => println!("{}: {} rows", r.object, r.rows),
        }
    }
    Ok(())
}

pub async fn rewrite_owners(
    data_dir: &Path,
    config: Option<PathBuf>,
    emails: &[String],
    replacement: &str,
) -> anyhow::Result<()> {
    let cfg = load_config(config.as_ref())?;
    let platform = connect().await?;
    let store = CsvSnapshotStore::new(data_dir);

    let quoted: Vec<String> = emails.iter().map(|e| format!("'{e}'")).collect();
    let soql = format!(
        "SELECT Id, Email FROM User WHERE Email IN ({})",
        quoted.join(",")
    );
    let rows = platform.query(&soql).await.context("querying users")?;
    let old_ids: HashSet<String> = rows
        .iter()
        .filter_map(|row| row.get("Id").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    if old_ids.is_empty() {
        anyhow::bail!("no users found for the given emails");
    }
    println!("replacing {} user id(s) with {replacement}", old_ids.len());

    let changed =
        snapshot::rewrite_ids(&store, &cfg.import_order, &old_ids, replacement).await?;
    println!("rewrote {changed} cell(s)");
    Ok(())
}

pub async fn check() -> anyhow::Result<()> {
    match SalesforceConfig::from_env() {
        Ok(cfg) => match SalesforceRestClient::connect(&cfg).await {
            Ok(client) => {
                match client.query("SELECT Id FROM Organization LIMIT 1").await {
                    Ok(_) => println!("salesforce: ok"),
                    Err(e) => println!("salesforce: error ({e})"),
                }
            }
            Err(e) => println!("salesforce: error ({e})"),
        },
        Err(e) => println!("salesforce: not configured ({e})"),
    }
    Ok(())
}
