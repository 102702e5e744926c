//! Cache counters exposed to the host process
//!
//! Counters are monotonic and atomically incremented; the host publishes the
//! snapshot maps on whatever metrics surface it runs (debug endpoint,
//! scraper, log dump). Counter names are part of the operator-visible
//! surface and must stay stable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Add `n` to the counter
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Read the current value
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for the build-cache adapter
#[derive(Debug, Default)]
pub struct BuildMetrics {
    /// Get hits served from the local stage
    pub get_local_hit: Counter,
    /// Get hits faulted in from the remote store
    pub get_fault_hit: Counter,
    /// Get faults that were remote misses
    pub get_fault_miss: Counter,
    /// Objects below the minimum size, not uploaded
    pub put_skip_small: Counter,
    /// Objects skipped because the remote already held identical content
    pub put_gcs_found: Counter,
    /// Action records written to the remote store
    pub put_gcs_action: Counter,
    /// Objects uploaded to the remote store
    pub put_gcs_object: Counter,
    /// Errors during background uploads
    pub put_gcs_error: Counter,
}

impl BuildMetrics {
    /// Snapshot the counters as a name -> value map for publication
    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        HashMap::from([
            ("get_local_hit", self.get_local_hit.get()),
            ("get_fault_hit", self.get_fault_hit.get()),
            ("get_fault_miss", self.get_fault_miss.get()),
            ("put_skip_small", self.put_skip_small.get()),
            ("put_gcs_found", self.put_gcs_found.get()),
            ("put_gcs_action", self.put_gcs_action.get()),
            ("put_gcs_object", self.put_gcs_object.get()),
            ("put_gcs_error", self.put_gcs_error.get()),
        ])
    }
}

/// Counters for the module-cache adapter
#[derive(Debug, Default)]
pub struct ModuleMetrics {
    /// Errors constructing local file paths
    pub path_error: Counter,
    /// Total Get requests
    pub get_request: Counter,
    /// Get hits in the local directory
    pub get_local_hit: Counter,
    /// Get misses in the local directory
    pub get_local_miss: Counter,
    /// Get hits in remote storage
    pub get_fault_hit: Counter,
    /// Get misses in remote storage
    pub get_fault_miss: Counter,
    /// Errors reading the local directory
    pub get_local_error: Counter,
    /// Errors reading from remote storage
    pub get_fault_error: Counter,
    /// Bytes served from the local directory
    pub get_local_bytes: Counter,
    /// Bytes fetched from remote storage
    pub get_storage_bytes: Counter,
    /// Total Put requests
    pub put_request: Counter,
    /// Puts of objects already stored locally
    pub put_local_hit: Counter,
    /// Errors writing the local directory
    pub put_local_error: Counter,
    /// Errors writing to remote storage
    pub put_storage_error: Counter,
    /// Bytes written to the local directory
    pub put_local_bytes: Counter,
    /// Bytes written to remote storage
    pub put_storage_bytes: Counter,
}

impl ModuleMetrics {
    /// Snapshot the counters as a name -> value map for publication
    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        HashMap::from([
            ("path_error", self.path_error.get()),
            ("get_request", self.get_request.get()),
            ("get_local_hit", self.get_local_hit.get()),
            ("get_local_miss", self.get_local_miss.get()),
            ("get_fault_hit", self.get_fault_hit.get()),
            ("get_fault_miss", self.get_fault_miss.get()),
            ("get_local_error", self.get_local_error.get()),
            ("get_fault_error", self.get_fault_error.get()),
            ("get_local_bytes", self.get_local_bytes.get()),
            ("get_storage_bytes", self.get_storage_bytes.get()),
            ("put_request", self.put_request.get()),
            ("put_local_hit", self.put_local_hit.get()),
            ("put_local_error", self.put_local_error.get()),
            ("put_storage_error", self.put_storage_error.get()),
            ("put_local_bytes", self.put_local_bytes.get()),
            ("put_storage_bytes", self.put_storage_bytes.get()),
        ])
    }
}
