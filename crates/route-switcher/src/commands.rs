use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rsw_cloud::{CloudClient, DocumentStore, YamlFileStore};
use rsw_config::Settings;
use rsw_core::{Document, Topology};
use rsw_reconcile::swap_pair;
use rsw_scheduler::{CycleOptions, PassContext, load_document, run_cycle, run_pass};
use tracing::{info, warn};

fn document_store(settings: &Settings) -> Result<Arc<YamlFileStore>> {
    let path = settings
        .document_path
        .as_deref()
        .context("document_path is not set")?;
    Ok(Arc::new(YamlFileStore::new(path)))
}

fn pass_context(settings: &Settings) -> Result<PassContext> {
    let token = settings
        .iam_token
        .clone()
        .context("an IAM token is required (set --iam-token or YC_IAM_TOKEN)")?;
    let client = CloudClient::new(settings.api.clone(), token, settings.folder_id.clone())?;
    Ok(PassContext::new(
        document_store(settings)?,
        Arc::new(client),
        settings,
    ))
}

async fn read_document(store: &YamlFileStore) -> Result<Document> {
    store
        .get()
        .await?
        .with_context(|| format!("Config document not found at '{}'", store.location()))
}

pub(crate) async fn run(settings: &Settings) -> Result<()> {
    let ctx = pass_context(settings)?;
    let summary = run_cycle(&ctx, CycleOptions::from(settings)).await;
    info!(
        passes = summary.passes,
        failed = summary.failed_passes,
        exit = ?summary.exit,
        "Invocation finished"
    );
    Ok(())
}

pub(crate) async fn once(settings: &Settings) -> Result<()> {
    let ctx = pass_context(settings)?;
    let document = load_document(&ctx).await?;
    if document.updating_tables {
        bail!(
            "updating_tables is set, another pass may still be in flight \
             (run `route-switcher unlock` to clear it)"
        );
    }

    let report = run_pass(&ctx, document).await?;
    let tables_changed = report.tables.iter().filter(|t| t.result.is_ok()).count();
    let interfaces_changed = report
        .interfaces
        .iter()
        .filter(|i| i.applied_operation().is_some())
        .count();
    println!("Route tables changed: {tables_changed}");
    println!("Interfaces changed: {interfaces_changed}");
    for blocked in &report.blocked {
        println!(
            "Blocked: {} stays on {} (backup {} is unhealthy)",
            blocked.prefix, blocked.current, blocked.backup
        );
    }
    if report.has_errors() {
        bail!("pass finished with errors, see log for details");
    }
    Ok(())
}

pub(crate) async fn check(settings: &Settings) -> Result<()> {
    let store = document_store(settings)?;
    let document = read_document(&store).await?;

    let errors = document.validation_errors();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("error: {e}");
        }
        bail!("{} problem(s) in {}", errors.len(), store.location());
    }

    println!("Document: {}", store.location());
    println!(
        "Load balancer: {} (target group {})",
        document.load_balancer_id, document.target_group_id
    );
    println!("Routers:");
    for router in &document.routers {
        let role = if router.primary { "primary" } else { "backup" };
        println!(
            "  {} {} vm={} interfaces={}",
            router.healthcheck_address,
            role,
            router.vm_id().unwrap_or("-"),
            router.interfaces.len()
        );
    }

    let topology = Topology::from_routers(&document.routers);
    println!("Next hops:");
    for (next_hop, owner) in topology.owned() {
        println!(
            "  {next_hop} (router {owner}) -> backup {}",
            topology.backup_of(next_hop).unwrap_or("-")
        );
    }

    println!("Route tables:");
    for table in &document.route_tables {
        println!(
            "  {} ({}): {} recorded route(s)",
            table.id,
            table.name.as_deref().unwrap_or("-"),
            table.routes.len()
        );
    }

    match swap_pair(&document.routers)? {
        Some(pair) => println!(
            "Security group swap: {} (primary) <-> {}",
            pair.primary.vm_id, pair.backup.vm_id
        ),
        None => println!("Security group swap: not configured"),
    }
    println!("updating_tables: {}", document.updating_tables);
    Ok(())
}

pub(crate) async fn unlock(settings: &Settings) -> Result<()> {
    let store = document_store(settings)?;
    let mut document = read_document(&store).await?;
    if !document.updating_tables {
        println!("updating_tables is not set");
        return Ok(());
    }

    warn!(location = %store.location(), "Clearing updating_tables by request");
    document.updating_tables = false;
    store.put(&document).await?;
    println!("updating_tables cleared");
    Ok(())
}
