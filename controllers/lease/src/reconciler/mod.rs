//! Reconciliation logic for Lease, Pool and Network resources.
//!
//! Every cycle runs under one lock around the [`ResourceIndex`]:
//! - `capacity`: pool accounting
//! - `networks`: network matching
//! - `fairness`: admission ordering
//! - `pool_strategy` / `allocator`: placement of a single lease
//! - `lease` / `pool`: entry points driven by the watchers

pub mod allocator;
pub mod capacity;
pub mod fairness;
pub mod index;
pub mod lease;
pub mod networks;
pub mod pool;
pub mod pool_strategy;


use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::metrics::LeaseMetrics;
use allocator::AllocationOptions;
use capacity::refresh_pool_status;
use capacity_client::CapacityStoreTrait;
use crds::LeasePhase;
use index::ResourceIndex;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(5, 60), // 5 seconds min, 60 seconds max
            error_count: 0,
        }
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles leases against pool capacity.
pub struct Reconciler {
    pub(crate) store: Box<dyn CapacityStoreTrait + Send + Sync>,
    /// Working set; holding this lock is holding the reconcile lock
    pub(crate) index: tokio::sync::Mutex<ResourceIndex>,
    pub(crate) metrics: Arc<LeaseMetrics>,
    pub(crate) options: AllocationOptions,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler with an empty index.
    pub fn new(
        store: Box<dyn CapacityStoreTrait + Send + Sync>,
        metrics: Arc<LeaseMetrics>,
        options: AllocationOptions,
    ) -> Self {
        Self {
            store,
            index: tokio::sync::Mutex::new(ResourceIndex::new()),
            metrics,
            options,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Rebuilds the index from the store.
    ///
    /// Called once before the watchers start so that the first cycles see
    /// every pool, network and live lease, and seeds the usage gauge with
    /// the leases that are already Fulfilled.
    pub async fn startup_reconciliation(&self) -> Result<(), ControllerError> {
        info!("Rebuilding resource index from the cluster...");
        let mut index = self.index.lock().await;

        for pool in self.store.list_pools().await? {
            index.upsert_pool(pool);
        }
        for network in self.store.list_networks().await? {
            index.upsert_network(network);
        }

        let mut fulfilled = 0;
        for lease in self.store.list_leases().await? {
            if lease.metadata.deletion_timestamp.is_some() {
                continue;
            }
            if lease.phase() == LeasePhase::Fulfilled {
                if let Some(pool) = lease.pool_ref() {
                    self.metrics.lease_fulfilled(&lease.namespace().unwrap_or_default(), &pool.name);
                    fulfilled += 1;
                }
            }
            index.upsert_lease(lease);
        }

        refresh_pool_status(&mut index);
        let (leases, pools, networks) = index.counts();
        info!(
            "Startup reconciliation complete: {} leases ({} fulfilled), {} pools, {} networks",
            leases, fulfilled, pools, networks
        );
        Ok(())
    }

    /// Get the Fibonacci backoff for a resource and advance its sequence
    ///
    /// Returns (backoff, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(5), 0)
            }
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }
}
