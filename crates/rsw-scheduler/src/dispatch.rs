//! Bounded-concurrency fan-out of route-table and interface mutations.

use std::future::Future;
use std::sync::Arc;

use rsw_cloud::{ComputeApi, OperationApi, RouteTableApi};
use rsw_core::MutationError;
use rsw_reconcile::{InterfaceUpdate, RouteTableMutation};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub const DEFAULT_PARALLELISM: usize = 8;

/// Run `task` for every item with at most `max_parallel` in flight.
///
/// Results come back in input order. A task that panics or is cancelled is
/// reported as `MutationError::TaskFailed` for its item; no partial result
/// is dropped.
pub async fn dispatch_bounded<I, T, F, Fut>(
    items: Vec<I>,
    max_parallel: usize,
    target: impl Fn(&I) -> String,
    task: F,
) -> Vec<Result<T, MutationError>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, MutationError>> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let targets: Vec<String> = items.iter().map(&target).collect();
    let mut join_set = JoinSet::new();

    for (slot, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let work = task(item);
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            (slot, work.await)
        });
    }

    let mut results: Vec<Option<Result<T, MutationError>>> =
        std::iter::repeat_with(|| None).take(targets.len()).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((slot, result)) => results[slot] = Some(result),
            Err(e) => error!("Mutation task join error: {}", e),
        }
    }

    results
        .into_iter()
        .zip(targets)
        .map(|(result, target)| {
            result.unwrap_or_else(|| {
                Err(MutationError::TaskFailed {
                    target,
                    reason: "task panicked or was cancelled".to_string(),
                })
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub table_id: String,
    pub table_name: String,
    /// Operation id of the accepted write.
    pub result: Result<String, MutationError>,
}

/// Send every rewritten route list; waits for all of them to finish.
pub async fn dispatch_route_tables(
    api: &Arc<dyn RouteTableApi>,
    mutations: &[RouteTableMutation],
    max_parallel: usize,
) -> Vec<TableOutcome> {
    let results = dispatch_bounded(
        mutations.to_vec(),
        max_parallel,
        |mutation| format!("route table {}", mutation.table_id),
        |mutation| {
            let api = Arc::clone(api);
            async move {
                api.write_table(&mutation.table_id, &mutation.static_routes)
                    .await
                    .map_err(|e| MutationError::Request {
                        target: format!("route table {}", mutation.table_id),
                        reason: format!("{e:#}"),
                    })
            }
        },
    )
    .await;

    mutations
        .iter()
        .zip(results)
        .map(|(mutation, result)| {
            match &result {
                Ok(operation) => info!(
                    table = %mutation.table_id,
                    operation = %operation,
                    "Route table update accepted"
                ),
                Err(e) => error!(table = %mutation.table_id, "{}", e),
            }
            TableOutcome {
                table_id: mutation.table_id.clone(),
                table_name: mutation.table_name.clone(),
                result,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceOutcome {
    Applied { operation_id: String },
    /// The previous mutation on this interface has not finished (or its
    /// status could not be read); nothing was sent.
    InProgress { operation_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceResult {
    pub update: InterfaceUpdate,
    pub outcome: Result<InterfaceOutcome, MutationError>,
}

impl InterfaceResult {
    pub fn applied_operation(&self) -> Option<&str> {
        match &self.outcome {
            Ok(InterfaceOutcome::Applied { operation_id }) => Some(operation_id),
            _ => None,
        }
    }
}

/// Send security-group replacements, keeping at most one in-flight
/// operation per interface.
pub async fn dispatch_interfaces(
    compute: &Arc<dyn ComputeApi>,
    operations: &Arc<dyn OperationApi>,
    updates: &[InterfaceUpdate],
    max_parallel: usize,
) -> Vec<InterfaceResult> {
    let results = dispatch_bounded(
        updates.to_vec(),
        max_parallel,
        interface_target,
        |update| {
            let compute = Arc::clone(compute);
            let operations = Arc::clone(operations);
            async move { update_interface(compute.as_ref(), operations.as_ref(), update).await }
        },
    )
    .await;

    updates
        .iter()
        .zip(results)
        .map(|(update, outcome)| InterfaceResult {
            update: update.clone(),
            outcome,
        })
        .collect()
}

fn interface_target(update: &InterfaceUpdate) -> String {
    format!("instance {} interface {}", update.vm_id, update.index)
}

async fn update_interface(
    compute: &dyn ComputeApi,
    operations: &dyn OperationApi,
    update: InterfaceUpdate,
) -> Result<InterfaceOutcome, MutationError> {
    let target = interface_target(&update);

    if let Some(previous) = &update.last_operation_id
        && operation_pending(operations, previous, &target).await
    {
        return Ok(InterfaceOutcome::InProgress {
            operation_id: previous.clone(),
        });
    }

    info!(
        router = %update.router,
        vm = %update.vm_id,
        index = update.index,
        groups = ?update.security_group_ids,
        "Updating security groups"
    );
    let operation_id = compute
        .update_interface(&update.vm_id, update.index, &update.security_group_ids)
        .await
        .map_err(|e| MutationError::Request {
            target: target.clone(),
            reason: format!("{e:#}"),
        })?;
    Ok(InterfaceOutcome::Applied { operation_id })
}

/// An unreadable status counts as still running; an operation the API no
/// longer knows counts as finished.
async fn operation_pending(operations: &dyn OperationApi, operation_id: &str, target: &str) -> bool {
    match operations.operation_status(operation_id).await {
        Ok(Some(status)) if status.done => {
            if let Some(reason) = status.error {
                warn!(interface = %target, operation = %operation_id, "Previous operation failed: {}", reason);
            }
            false
        }
        Ok(Some(_)) => {
            info!(
                interface = %target,
                operation = %operation_id,
                "Previous operation is still running, skipping"
            );
            true
        }
        Ok(None) => {
            warn!(
                interface = %target,
                operation = %operation_id,
                "Previous operation is unknown, proceeding"
            );
            false
        }
        Err(e) => {
            warn!(
                interface = %target,
                operation = %operation_id,
                "Cannot read operation status, skipping: {:#}", e
            );
            true
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
