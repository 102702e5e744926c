//! Build cache adapter
//!
//! Serves the toolchain's external build cache protocol from a local stage
//! backed by the remote object store.
//!
//! # Remote Cache Layout
//!
//! Records are grouped into two kinds. Each action record is stored under:
//!
//! ```text
//! [<prefix>/]action/<hh>/<action-id>
//! ```
//!
//! and each output object under:
//!
//! ```text
//! [<prefix>/]output/<hh>/<output-id>
//! ```
//!
//! with ids encoded as lower-hex and `<hh>` the first two characters of the
//! id, partitioning each kind into 256 buckets. Action contents are the
//! single-line record described in [`crate::stage::record`]; output files
//! hold the raw object body.
//!
//! Reads fault records in from the remote store on a local miss; writes land
//! locally, reply to the client, and upload in the background. The output is
//! uploaded before its action record so a concurrent reader never observes
//! an action pointing at a missing output.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::error::{StratusError, StratusResult};
use crate::metrics::BuildMetrics;
use crate::remote::{join_key, EtagReader, EtagSink, ObjectStore};
use crate::stage::record::is_hex_id;
use crate::stage::{ActionRecord, Object, Stage};
use crate::tasks::{TaskGroup, UPLOAD_TIMEOUT};

/// A successful cache lookup: the output id and its staged local path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHit {
    /// Content-addressed id of the output
    pub output_id: String,
    /// Local path the toolchain can read the output from
    pub disk_path: PathBuf,
}

/// Build cache backed by a local stage and a remote object store
pub struct BuildCache {
    stage: Stage,
    remote: Arc<dyn ObjectStore>,
    key_prefix: String,
    min_upload_size: u64,
    expiration: Option<Duration>,
    push: TaskGroup,
    metrics: Arc<BuildMetrics>,
}

impl std::fmt::Debug for BuildCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildCache")
            .field("key_prefix", &self.key_prefix)
            .field("min_upload_size", &self.min_upload_size)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl BuildCache {
    /// Create a build cache from settings and a bound remote store
    pub async fn new(
        settings: &CacheSettings,
        remote: Arc<dyn ObjectStore>,
    ) -> StratusResult<Self> {
        if settings.local_dir.as_os_str().is_empty() {
            return Err(StratusError::ConfigMissing("cache.local_dir"));
        }
        let stage = Stage::new(&settings.local_dir).await?;
        Ok(Self {
            stage,
            remote,
            key_prefix: settings.key_prefix.clone(),
            min_upload_size: settings.min_upload_size,
            expiration: settings.expiration(),
            push: TaskGroup::new(settings.upload_concurrency),
            metrics: Arc::new(BuildMetrics::default()),
        })
    }

    /// Look up an action, faulting in from the remote store on a local miss
    ///
    /// `Ok(None)` is a cache miss. A remote action hit whose output cannot
    /// be fetched is an error, because the action record commits to the
    /// output's existence.
    pub async fn get(&self, action_id: &str) -> StratusResult<Option<ActionHit>> {
        if !is_hex_id(action_id) {
            return Err(StratusError::InvalidId(action_id.to_string()));
        }

        match self.stage.get(action_id).await {
            Ok(Some((output_id, disk_path))) => {
                self.metrics.get_local_hit.add(1);
                return Ok(Some(ActionHit {
                    output_id,
                    disk_path,
                }));
            }
            Ok(None) => {}
            Err(e) => debug!("local get {}: {} (treating as miss)", action_id, e),
        }

        // Local miss or local error; try the remote action record.
        let data = match self.remote.get_data(&self.action_key(action_id)).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                self.metrics.get_fault_miss.add(1);
                return Ok(None);
            }
            Err(e) => {
                return Err(StratusError::RemoteAction {
                    action_id: action_id.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let record = ActionRecord::parse(&data)?;

        let (body, size) = match self.remote.get(&self.output_key(&record.output_id)).await {
            Ok(found) => found,
            Err(e) => {
                // The action exists, so a missing output is a broken record,
                // not a cache miss.
                return Err(StratusError::RemoteOutput {
                    output_id: record.output_id,
                    reason: e.to_string(),
                });
            }
        };
        self.metrics.get_fault_hit.add(1);

        // Stage the body locally, preserving the modification time recorded
        // with the original action.
        let disk_path = self
            .stage
            .put(Object {
                action_id: action_id.to_string(),
                output_id: record.output_id.clone(),
                size,
                body,
                mod_time: Some(record.mod_time),
            })
            .await?;

        Ok(Some(ActionHit {
            output_id: record.output_id,
            disk_path,
        }))
    }

    /// Stage an object locally and schedule its upload
    ///
    /// Returns the staged path as soon as the local write lands; the remote
    /// write happens in the background and its failures never reach this
    /// caller. Objects smaller than the configured minimum stay local only.
    pub async fn put(&self, obj: Object) -> StratusResult<PathBuf> {
        let Object {
            action_id,
            output_id,
            size,
            body,
            mod_time,
        } = obj;

        let (reader, etag) = EtagReader::new(body);
        let disk_path = self
            .stage
            .put(Object {
                action_id: action_id.clone(),
                output_id: output_id.clone(),
                size,
                body: Box::new(reader),
                mod_time,
            })
            .await?; // local failure: don't bother with the remote write

        if size < self.min_upload_size {
            self.metrics.put_skip_small.add(1);
            return Ok(disk_path);
        }

        let remote = Arc::clone(&self.remote);
        let metrics = Arc::clone(&self.metrics);
        let output_key = self.output_key(&output_id);
        let action_key = self.action_key(&action_id);
        let staged = disk_path.clone();
        self.push
            .spawn(async move {
                let upload = upload_record(
                    remote,
                    Arc::clone(&metrics),
                    staged,
                    output_key,
                    action_key,
                    output_id,
                    etag,
                );
                if tokio::time::timeout(UPLOAD_TIMEOUT, upload).await.is_err() {
                    metrics.put_gcs_error.add(1);
                    warn!("background upload timed out after {:?}", UPLOAD_TIMEOUT);
                }
            })
            .await;

        Ok(disk_path)
    }

    /// Drain pending uploads, run stage cleanup, and close the remote store
    pub async fn close(&self) -> StratusResult<()> {
        debug!("waiting for uploads...");
        let started = Instant::now();
        self.push.wait().await;
        debug!("uploads complete ({:?} elapsed)", started.elapsed());

        let mut first_err = None;
        if let Some(max_age) = self.expiration {
            if let Err(e) = self.stage.cleanup(max_age).await {
                warn!("stage cleanup: {}", e);
                first_err = Some(e);
            }
        }
        if let Err(e) = self.remote.close().await {
            warn!("closing remote store: {}", e);
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Counters for the host to publish
    pub fn metrics(&self) -> &BuildMetrics {
        &self.metrics
    }

    /// The underlying stage, for host-driven cleanup and reporting
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    fn action_key(&self, id: &str) -> String {
        join_key(&[&self.key_prefix, "action", &id[..2], id])
    }

    fn output_key(&self, id: &str) -> String {
        join_key(&[&self.key_prefix, "output", &id[..2], id])
    }
}

/// One background upload: the object first, then its action record
async fn upload_record(
    remote: Arc<dyn ObjectStore>,
    metrics: Arc<BuildMetrics>,
    staged: PathBuf,
    output_key: String,
    action_key: String,
    output_id: String,
    etag: EtagSink,
) {
    let file = match fs::File::open(&staged).await {
        Ok(f) => f,
        Err(e) => {
            metrics.put_gcs_error.add(1);
            warn!("open staged object {}: {}", staged.display(), e);
            return;
        }
    };
    let mod_time: DateTime<Utc> = match file.metadata().await.and_then(|m| m.modified()) {
        Ok(t) => t.into(),
        Err(e) => {
            metrics.put_gcs_error.add(1);
            warn!("stat staged object {}: {}", staged.display(), e);
            return;
        }
    };

    // Stage 1: maybe write the object. The store skips the write when it
    // already holds identical content under this key.
    match remote.put_cond(&output_key, &etag.etag(), Box::new(file)).await {
        Ok(true) => metrics.put_gcs_object.add(1),
        Ok(false) => metrics.put_gcs_found.add(1),
        Err(e) => {
            metrics.put_gcs_error.add(1);
            warn!("put object {}: {}", output_id, e);
            return;
        }
    }

    // Stage 2: write the action record.
    let record = ActionRecord::new(output_id, mod_time).encode();
    match remote
        .put(&action_key, Box::new(Cursor::new(record.into_bytes())))
        .await
    {
        Ok(()) => metrics.put_gcs_action.add(1),
        Err(e) => {
            metrics.put_gcs_error.add(1);
            warn!("write action {}: {}", action_key, e);
        }
    }
}
