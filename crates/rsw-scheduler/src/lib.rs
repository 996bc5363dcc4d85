//! Pass orchestration: bounded mutation dispatch, the single reconciliation
//! pass and the time-boxed cycle that repeats it within one invocation.

pub mod cycle;
pub mod dispatch;
pub mod pass;

pub use cycle::{CycleExit, CycleOptions, CycleSummary, run_cycle};
pub use dispatch::{
    DEFAULT_PARALLELISM, InterfaceOutcome, InterfaceResult, TableOutcome, dispatch_bounded,
    dispatch_interfaces, dispatch_route_tables,
};
pub use pass::{PassContext, PassReport, load_document, run_pass};

#[cfg(test)]
mod test_support;
