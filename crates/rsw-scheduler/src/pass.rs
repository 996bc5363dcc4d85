//! One reconciliation pass.
//!
//! A pass re-derives everything from fresh reads: document, health, observed
//! route tables and live interfaces. The document is written at most twice:
//! once to raise `updating_tables` before route mutations go out, and once
//! at the end to clear it and record drift changes and new operation ids.

use std::collections::BTreeSet;
use std::sync::Arc;

use rsw_cloud::{ComputeApi, DocumentStore, HealthSource, MetricsSink, OperationApi, RouteTableApi};
use rsw_config::Settings;
use rsw_core::{
    ChangeStatus, ConfigError, Document, DriftError, FailbackPolicy, HealthError, MetricLabels,
    MetricsBatch, PassError, Topology,
};
use rsw_reconcile::{
    BlockedPrefix, HealthView, InterfaceIssue, SecurityProfile, SwapIntent, SwapPair, TablePlan,
    evaluate, plan_swap, plan_table, reconcile_routes, swap_pair,
};
use tracing::{error, info, warn};

use crate::dispatch::{
    InterfaceOutcome, InterfaceResult, TableOutcome, dispatch_interfaces, dispatch_route_tables,
};

/// Everything a pass needs, constructed once per invocation.
#[derive(Clone)]
pub struct PassContext {
    pub store: Arc<dyn DocumentStore>,
    pub health: Arc<dyn HealthSource>,
    pub tables: Arc<dyn RouteTableApi>,
    pub compute: Arc<dyn ComputeApi>,
    pub operations: Arc<dyn OperationApi>,
    pub metrics: Arc<dyn MetricsSink>,
    pub policy: FailbackPolicy,
    pub max_parallel: usize,
    pub labels: MetricLabels,
}

impl PassContext {
    /// Wire a document store and one client serving every cloud API.
    pub fn new<C>(store: Arc<dyn DocumentStore>, cloud: Arc<C>, settings: &Settings) -> Self
    where
        C: HealthSource + RouteTableApi + ComputeApi + OperationApi + MetricsSink + 'static,
    {
        Self {
            store,
            health: cloud.clone(),
            tables: cloud.clone(),
            compute: cloud.clone(),
            operations: cloud.clone(),
            metrics: cloud,
            policy: settings.policy(),
            max_parallel: settings.max_parallel,
            labels: settings.metric_labels(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PassReport {
    pub drift_errors: Vec<DriftError>,
    pub blocked: Vec<BlockedPrefix>,
    pub tables: Vec<TableOutcome>,
    pub swap_intent: Option<SwapIntent>,
    pub swap_issues: Vec<InterfaceIssue>,
    /// Live interfaces of the pair could not be read.
    pub swap_error: Option<String>,
    pub interfaces: Vec<InterfaceResult>,
    /// Number of document writes issued by this pass.
    pub document_writes: usize,
}

impl PassReport {
    /// Whether any mutation was accepted; the invocation should stop and let
    /// the cloud operations settle.
    pub fn settled(&self) -> bool {
        self.tables.iter().any(|t| t.result.is_ok())
            || self.interfaces.iter().any(|i| i.applied_operation().is_some())
    }

    pub fn has_errors(&self) -> bool {
        !self.drift_errors.is_empty()
            || self.swap_error.is_some()
            || self.tables.iter().any(|t| t.result.is_err())
            || self.interfaces.iter().any(|i| i.outcome.is_err())
    }
}

/// Fetch the current document from the store.
pub async fn load_document(ctx: &PassContext) -> Result<Document, PassError> {
    match ctx.store.get().await {
        Ok(Some(document)) => Ok(document),
        Ok(None) => Err(ConfigError::DocumentNotFound(ctx.store.location()).into()),
        Err(e) => match e.downcast_ref::<ConfigError>() {
            Some(config) => Err(config.clone().into()),
            None => Err(PassError::Load(format!("{e:#}"))),
        },
    }
}

/// Run one pass against `document`. Metrics collected along the way are
/// flushed whatever the outcome.
pub async fn run_pass(ctx: &PassContext, mut document: Document) -> Result<PassReport, PassError> {
    let mut metrics = MetricsBatch::new(ctx.labels.clone());
    let result = reconcile(ctx, &mut document, &mut metrics).await;
    flush_metrics(ctx, &mut metrics).await;
    result
}

async fn reconcile(
    ctx: &PassContext,
    document: &mut Document,
    metrics: &mut MetricsBatch,
) -> Result<PassReport, PassError> {
    let errors = document.validation_errors();
    if let Some(first) = errors.first() {
        for e in &errors {
            error!("Invalid config document: {}", e);
        }
        return Err(first.clone().into());
    }

    let topology = Topology::from_routers(&document.routers);
    let pair = swap_pair(&document.routers)?;
    let view = fetch_health(ctx, document, &topology, metrics).await?;

    for router in &document.routers {
        metrics.router_state(
            &router.healthcheck_address,
            view.router_healthy(&router.healthcheck_address),
        );
    }

    let mut report = PassReport::default();
    let mut document_changed = false;

    let mut plans = Vec::new();
    for table in &mut document.route_tables {
        let observed = match ctx.tables.read_table(&table.id).await {
            Ok(observed) => observed,
            Err(e) => {
                let err = DriftError::Unreadable {
                    table: table.id.clone(),
                    reason: format!("{e:#}"),
                };
                error!(table = %table.id, "{}", err);
                report.drift_errors.push(err);
                continue;
            }
        };

        match reconcile_routes(&table.routes, &observed, &topology) {
            Ok(outcome) => {
                if outcome.changed() {
                    info!(
                        table = %table.id,
                        inserted = ?outcome.inserted,
                        removed = ?outcome.removed,
                        "Recorded routes updated from route table"
                    );
                    table.routes = outcome.routes;
                    document_changed = true;
                }
            }
            Err(err) => {
                error!(table = %table.id, "{}", err);
                report.drift_errors.push(err);
                continue;
            }
        }

        plans.push(plan_table(table, &observed, &view, &topology, ctx.policy));
    }

    let mutations: Vec<_> = plans
        .iter()
        .filter_map(|plan: &TablePlan| plan.mutation.clone())
        .collect();
    for plan in &plans {
        report.blocked.extend(plan.blocked.iter().cloned());
        if plan.mutation.is_none() {
            metrics.table_changed(&plan.table_name, ChangeStatus::Unchanged);
        }
    }
    metrics.switchover(!mutations.is_empty());

    if !mutations.is_empty() {
        document.updating_tables = true;
        persist(ctx, document, &mut report).await?;

        report.tables = dispatch_route_tables(&ctx.tables, &mutations, ctx.max_parallel).await;
        for outcome in &report.tables {
            let status = match outcome.result {
                Ok(_) => ChangeStatus::Changed,
                Err(_) => ChangeStatus::Failed,
            };
            metrics.table_changed(&outcome.table_name, status);
        }
    }

    if let Some(pair) = pair {
        document_changed |= reconcile_swap(ctx, document, &pair, &view, metrics, &mut report).await;
    }

    if document.updating_tables || document_changed {
        document.updating_tables = false;
        persist(ctx, document, &mut report).await?;
    }

    Ok(report)
}

async fn fetch_health(
    ctx: &PassContext,
    document: &Document,
    topology: &Topology,
    metrics: &mut MetricsBatch,
) -> Result<HealthView, PassError> {
    let snapshot = ctx
        .health
        .target_health(&document.load_balancer_id, &document.target_group_id)
        .await
        .map_err(|e| HealthError::Unavailable(format!("{e:#}")))?;

    let view = match evaluate(&snapshot, topology) {
        Ok(view) => view,
        Err(err) => {
            if let HealthError::AllUnhealthy { addresses } = &err {
                for address in addresses {
                    metrics.router_state(address, false);
                }
            }
            error!("{}", err);
            return Err(err.into());
        }
    };

    if let Some(router) = document
        .routers
        .iter()
        .find(|router| !snapshot.contains_key(&router.healthcheck_address))
    {
        return Err(ConfigError::RouterNotInTargetGroup {
            router: router.healthcheck_address.clone(),
            load_balancer: document.load_balancer_id.clone(),
        }
        .into());
    }

    Ok(view)
}

/// Returns whether the document picked up new operation ids.
async fn reconcile_swap(
    ctx: &PassContext,
    document: &mut Document,
    pair: &SwapPair,
    view: &HealthView,
    metrics: &mut MetricsBatch,
    report: &mut PassReport,
) -> bool {
    let (live_primary, live_backup) = match tokio::try_join!(
        live_profile(ctx, &pair.primary.vm_id),
        live_profile(ctx, &pair.backup.vm_id)
    ) {
        Ok(live) => live,
        Err(e) => {
            error!("Cannot read security groups of router instances: {:#}", e);
            report.swap_error = Some(format!("{e:#}"));
            return false;
        }
    };

    let plan = plan_swap(pair, view, ctx.policy, &live_primary, &live_backup);
    report.swap_intent = Some(plan.intent);
    for issue in &plan.issues {
        warn!(?issue, "Interface is missing on the router instance");
    }
    report.swap_issues = plan.issues.clone();

    let SwapIntent::Assign { .. } = plan.intent else {
        warn!("Both routers are unhealthy, security groups are left unchanged");
        return false;
    };

    let updated: BTreeSet<(&str, u32)> = plan
        .updates
        .iter()
        .map(|u| (u.router.as_str(), u.index))
        .collect();
    for member in pair.members() {
        for index in member.native.keys() {
            if !updated.contains(&(member.router.as_str(), *index)) {
                metrics.security_groups_changed(&member.router, *index, ChangeStatus::Unchanged);
            }
        }
    }

    if plan.updates.is_empty() {
        return false;
    }

    report.interfaces =
        dispatch_interfaces(&ctx.compute, &ctx.operations, &plan.updates, ctx.max_parallel).await;

    let mut recorded = false;
    for result in &report.interfaces {
        let update = &result.update;
        let status = match &result.outcome {
            Ok(InterfaceOutcome::Applied { .. }) => ChangeStatus::Changed,
            Ok(InterfaceOutcome::InProgress { .. }) => ChangeStatus::Unchanged,
            Err(e) => {
                error!(router = %update.router, index = update.index, "{}", e);
                ChangeStatus::Failed
            }
        };
        metrics.security_groups_changed(&update.router, update.index, status);

        if let Some(operation) = result.applied_operation()
            && let Some(router) = document.router_mut_by_vm(&update.vm_id)
        {
            recorded |= router.record_operation(update.index, operation);
        }
    }
    recorded
}

async fn live_profile(ctx: &PassContext, vm_id: &str) -> anyhow::Result<SecurityProfile> {
    let interfaces = ctx.compute.read_interfaces(vm_id).await?;
    Ok(interfaces
        .into_iter()
        .map(|iface| (iface.index, iface.security_group_ids))
        .collect())
}

async fn persist(
    ctx: &PassContext,
    document: &Document,
    report: &mut PassReport,
) -> Result<(), PassError> {
    ctx.store.put(document).await.map_err(|e| {
        let err = PassError::Persist(format!("{e:#}"));
        error!(location = %ctx.store.location(), "{}", err);
        err
    })?;
    report.document_writes += 1;
    Ok(())
}

async fn flush_metrics(ctx: &PassContext, metrics: &mut MetricsBatch) {
    if metrics.is_empty() {
        return;
    }
    let events = metrics.take();
    if let Err(e) = ctx.metrics.write_metrics(&events).await {
        warn!(count = events.len(), "Failed to write metrics: {:#}", e);
    }
}

#[cfg(test)]
#[path = "pass_tests.rs"]
mod tests;
