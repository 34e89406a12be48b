use std::sync::Arc;
use std::sync::atomic::Ordering;

use ingest_core::config::Config;
use ingest_core::domain::{NewPackage, StatusUpdate};
use ingest_core::error::{IngestError, Result};
use ingest_core::stats::{PassReport, SweepReport};
use ingest_core::store::{Backend, ObjectStore, open_store};
use ingest_core::tracking::{JournalTrackingStore, PackageFilter, TrackingStore};
use ingest_core::{ASSET_VALIDATION_CHECK, Orchestrator, Package, PackageKey, Status, handle_trigger};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::MissedTickBehavior;

const OPERATOR: &str = "operator";

/// Stores opened from the config, shared by every command.
pub struct Context {
    pub config: Config,
    pub store: Arc<dyn ObjectStore>,
    pub tracking: Arc<dyn TrackingStore>,
}

impl Context {
    pub fn open(config: Config) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = Arc::from(open_store(Backend::Fs, config.layout())?);
        let tracking = Arc::new(JournalTrackingStore::open(&config.tracking.journal)?);
        Ok(Self {
            config,
            store,
            tracking,
        })
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.tracking),
            self.config.policy(),
        )
    }
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

fn to_json<T: serde::Serialize>(v: &T) -> Result<String> {
    serde_json::to_string_pretty(v).map_err(|e| IngestError::Format(format!("json: {e}")))
}

fn print_report(report: &PassReport) -> Result<()> {
    println!("{}", to_json(report)?);
    Ok(())
}

pub async fn handle_run(ctx: Context, interval: Option<u64>, once: bool) -> Result<()> {
    let secs = interval.unwrap_or(ctx.config.worker.interval_secs).max(1);
    let orch = Arc::new(ctx.orchestrator());
    let stop = orch.shutdown_handle();
    let body = serde_json::json!({ "trigger": ASSET_VALIDATION_CHECK }).to_string();

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_secs = secs, once, "worker started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted while idle");
                break;
            }
        }

        let worker = Arc::clone(&orch);
        let msg = body.clone();
        let mut pass = tokio::task::spawn_blocking(move || {
            handle_trigger(&worker, &msg, OffsetDateTime::now_utc())
        });
        let joined = tokio::select! {
            r = &mut pass => r,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupt received, finishing the current package");
                stop.store(true, Ordering::SeqCst);
                pass.await
            }
        };

        match joined.map_err(|e| IngestError::Io(std::io::Error::other(e)))? {
            Ok(Some(report)) => {
                tracing::info!(
                    pass_id = %report.pass_id,
                    processed = report.processed,
                    failed = report.failed,
                    "pass finished"
                );
                if once {
                    print_report(&report)?;
                }
            }
            Ok(None) => {}
            // a tracking outage fails the whole pass; keep polling
            Err(e) => tracing::error!(error = %e, "pass aborted"),
        }

        if once || stop.load(Ordering::SeqCst) {
            break;
        }
    }
    tracing::info!("worker stopped");
    Ok(())
}

pub fn handle_trigger_message(ctx: &Context, message: &str) -> Result<Option<PassReport>> {
    let report = handle_trigger(&ctx.orchestrator(), message, OffsetDateTime::now_utc())?;
    match &report {
        Some(r) => print_report(r)?,
        None => eprintln!("trigger ignored"),
    }
    Ok(report)
}

pub fn handle_pass(ctx: &Context) -> Result<PassReport> {
    let report = ctx.orchestrator().run_pass(OffsetDateTime::now_utc())?;
    print_report(&report)?;
    Ok(report)
}

pub fn handle_validate(ctx: &Context, title: String, asset: String) -> Result<Status> {
    let v = ctx.orchestrator().validate_only(&PackageKey::new(title, asset))?;
    let out = serde_json::json!({
        "package": v.key.to_string(),
        "status": v.outcome.status,
        "rule": v.outcome.rule,
        "manifest": v.manifest_key,
        "files": v.inventory.entries.len(),
        "discrepancies": v.outcome.discrepancies,
    });
    println!("{}", to_json(&out)?);
    Ok(v.outcome.status)
}

pub fn handle_register(
    ctx: &Context,
    title: String,
    asset: String,
    status: Status,
    created: Option<String>,
    prefix: Option<String>,
) -> Result<Package> {
    let created = match created {
        Some(s) => OffsetDateTime::parse(&s, &Rfc3339)
            .map_err(|e| IngestError::Format(format!("--created {s:?}: {e}")))?,
        None => OffsetDateTime::now_utc(),
    };
    let pkg = ctx.tracking.register(NewPackage {
        key: PackageKey::new(title, asset),
        status,
        created,
        staging_prefix: prefix,
        registered_by: OPERATOR.to_string(),
    })?;
    println!("registered {} as {} (prefix {})", pkg.key, pkg.status, pkg.staging_prefix);
    Ok(pkg)
}

pub fn handle_status(ctx: &Context, status: Option<Status>) -> Result<Vec<Package>> {
    let filter = PackageFilter {
        status,
        ..Default::default()
    };
    let rows = ctx.tracking.query(&filter)?;
    for p in &rows {
        println!(
            "{:<32} {:<18} rev={:<4} created={} modified={} by={}",
            p.key.to_string(),
            p.status.as_str(),
            p.revision,
            rfc3339(p.created),
            rfc3339(p.modified),
            p.modified_by
        );
    }
    eprintln!("{} package(s)", rows.len());
    Ok(rows)
}

pub fn handle_reset(ctx: &Context, title: String, asset: String, to: Status) -> Result<Package> {
    let key = PackageKey::new(title, asset);
    let current = ctx
        .tracking
        .get(&key)?
        .ok_or_else(|| IngestError::Tracking(format!("unknown package {key}")))?;
    let update = StatusUpdate::status_only(to, OffsetDateTime::now_utc(), OPERATOR);
    let pkg = ctx
        .tracking
        .compare_and_set(&key, current.revision, update)?
        .ok_or_else(|| IngestError::Tracking(format!("{key} changed while resetting; retry")))?;
    ctx.tracking.annotate(&format!(
        "{key} reset from {} to {} by {OPERATOR}",
        current.status, pkg.status
    ))?;
    tracing::info!(package = %key, from = %current.status, to = %pkg.status, "status reset");
    println!("{}: {} -> {}", key, current.status, pkg.status);
    Ok(pkg)
}

pub fn handle_sweep(ctx: &Context) -> Result<SweepReport> {
    let report = ctx.orchestrator().sweep(OffsetDateTime::now_utc())?;
    println!("{}", to_json(&report)?);
    Ok(report)
}
