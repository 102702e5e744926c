//! Module cache adapter
//!
//! Caches package archives and checksum files for the module proxy, using a
//! local disk tree backed by the remote object store.
//!
//! # Cache Layout
//!
//! Entries are stored under the SHA-256 digest of the name presented to the
//! cache, encoded as lower-hex and partitioned by its first two characters:
//!
//! ```text
//! SHA256("fizzlepug") -> 160db4d71925...
//! <local-dir>/module/16/160db4d71925...         local file
//! [<prefix>/]module/16/160db4d71925...          remote key
//! ```
//!
//! Fault-ins are bounded by a semaphore and write-backs by a task group;
//! both are sized from `max_tasks` but are independent pools, so a backed-up
//! write-back queue does not throttle reads.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::error::{StratusError, StratusResult};
use crate::metrics::ModuleMetrics;
use crate::remote::{join_key, ObjectStore};
use crate::stage::write_atomic;
use crate::tasks::{TaskGroup, UPLOAD_TIMEOUT};

/// Bytes served back to the module proxy
pub type ModuleReader = Cursor<Vec<u8>>;

/// Module cache backed by a local directory and a remote object store
pub struct ModuleCache {
    root: PathBuf,
    remote: Arc<dyn ObjectStore>,
    key_prefix: String,
    log_requests: bool,
    tasks: TaskGroup,
    sema: Arc<Semaphore>,
    metrics: Arc<ModuleMetrics>,
}

impl ModuleCache {
    /// Create a module cache from settings and a bound remote store
    ///
    /// The local tree lives under `<local_dir>/module`, inside the shared
    /// stage root so age-based cleanup covers it.
    pub async fn new(
        settings: &CacheSettings,
        remote: Arc<dyn ObjectStore>,
    ) -> StratusResult<Self> {
        if settings.local_dir.as_os_str().is_empty() {
            return Err(StratusError::ConfigMissing("cache.local_dir"));
        }
        let root = settings.local_dir.join("module");
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StratusError::io(format!("creating module cache {}", root.display()), e))?;

        let max_tasks = if settings.max_tasks == 0 {
            crate::tasks::default_limit()
        } else {
            settings.max_tasks
        };
        Ok(Self {
            root,
            remote,
            key_prefix: settings.key_prefix.clone(),
            log_requests: settings.log_requests,
            tasks: TaskGroup::new(max_tasks),
            sema: Arc::new(Semaphore::new(max_tasks)),
            metrics: Arc::new(ModuleMetrics::default()),
        })
    }

    /// Fetch a cached entry by name, faulting in from the remote store
    ///
    /// A miss in both tiers returns the not-found sentinel.
    pub async fn get(&self, name: &str) -> StratusResult<ModuleReader> {
        self.metrics.get_request.add(1);
        let started = Instant::now();
        let hash = hash_name(name);

        self.vlog(format!("B GET {name:?} ({hash})"));
        let result = self.get_inner(name, &hash).await;
        self.vlog(format!(
            "E GET {:?}, err={}, {:?} elapsed",
            name,
            err_label(&result),
            started.elapsed()
        ));
        result
    }

    async fn get_inner(&self, name: &str, hash: &str) -> StratusResult<ModuleReader> {
        let path = self.make_path(hash).await?;

        // Check whether the file already exists locally.
        match fs::read(&path).await {
            Ok(data) => {
                self.metrics.get_local_hit.add(1);
                self.metrics.get_local_bytes.add(data.len() as u64);
                return Ok(Cursor::new(data));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.metrics.get_local_miss.add(1);
            }
            Err(e) => {
                self.metrics.get_local_error.add(1);
                warn!("get {:?} local: {} (treating as miss)", name, e);
            }
        }

        // Local miss, fault in from the remote store under a bounded number
        // of concurrent fault-ins.
        let _permit = self
            .sema
            .acquire()
            .await
            .map_err(|e| StratusError::Internal(format!("fault-in semaphore: {e}")))?;

        let (body, _size) = match self.remote.get(&self.make_key(hash)).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                self.metrics.get_fault_miss.add(1);
                return Err(e);
            }
            Err(e) => {
                self.metrics.get_fault_error.add(1);
                return Err(e);
            }
        };
        self.metrics.get_fault_hit.add(1);
        self.vlog(format!("F GET {name:?} hit ({hash})"));

        self.put_local(&path, body).await?;
        let data = fs::read(&path)
            .await
            .map_err(|e| StratusError::io(format!("reading staged {}", path.display()), e))?;
        self.metrics.get_storage_bytes.add(data.len() as u64);
        Ok(Cursor::new(data))
    }

    /// Store an entry locally and schedule its write-back
    ///
    /// Returns once the local write lands. If the file already existed the
    /// write-back is elided: identical names carry identical content.
    pub async fn put(
        &self,
        name: &str,
        data: impl AsyncRead + Send + Unpin,
    ) -> StratusResult<()> {
        self.metrics.put_request.add(1);
        let started = Instant::now();
        let hash = hash_name(name);

        self.vlog(format!("B PUT {name:?} ({hash})"));
        let result = self.put_inner(name, &hash, data).await;
        self.vlog(format!(
            "E PUT {:?}, err={}, {:?} elapsed",
            name,
            err_label(&result),
            started.elapsed()
        ));
        result
    }

    async fn put_inner(
        &self,
        name: &str,
        hash: &str,
        data: impl AsyncRead + Send + Unpin,
    ) -> StratusResult<()> {
        let path = self.make_path(hash).await?;

        if self.put_local(&path, data).await? {
            self.metrics.put_local_hit.add(1);
            return Ok(());
        }

        // Push the object to the remote store in the background.
        let file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                self.metrics.put_local_error.add(1);
                return Err(StratusError::io(
                    format!("opening staged {}", path.display()),
                    e,
                ));
            }
        };
        let size = match file.metadata().await {
            Ok(meta) => meta.len(),
            Err(e) => {
                self.metrics.put_local_error.add(1);
                return Err(StratusError::io(
                    format!("stat staged {}", path.display()),
                    e,
                ));
            }
        };

        let remote = Arc::clone(&self.remote);
        let metrics = Arc::clone(&self.metrics);
        let key = self.make_key(hash);
        let name = name.to_string();
        let log_requests = self.log_requests;
        self.tasks
            .spawn(async move {
                let started = Instant::now();
                let result = tokio::time::timeout(UPLOAD_TIMEOUT, remote.put(&key, Box::new(file))).await;
                let err = match result {
                    Ok(Ok(())) => {
                        metrics.put_storage_bytes.add(size);
                        None
                    }
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(_) => Some(format!("timed out after {UPLOAD_TIMEOUT:?}")),
                };
                if let Some(ref e) = err {
                    metrics.put_storage_error.add(1);
                    warn!("write-back {:?} failed: {}", name, e);
                }
                if log_requests {
                    debug!(
                        "W PUT {:?}, err={}, {:?} elapsed",
                        name,
                        err.as_deref().unwrap_or("none"),
                        started.elapsed()
                    );
                }
            })
            .await;
        Ok(())
    }

    /// Wait until all background write-backs are complete
    pub async fn close(&self) -> StratusResult<()> {
        self.tasks.wait().await;
        Ok(())
    }

    /// Counters for the host to publish
    pub fn metrics(&self) -> &ModuleMetrics {
        &self.metrics
    }

    /// Report whether `path` already exists, writing `data` into it if not
    async fn put_local(
        &self,
        path: &Path,
        data: impl AsyncRead + Send + Unpin,
    ) -> StratusResult<bool> {
        if fs::metadata(path).await.is_ok() {
            return Ok(true);
        }
        match write_atomic(path, data).await {
            Ok(written) => {
                self.metrics.put_local_bytes.add(written);
                Ok(false)
            }
            Err(e) => {
                self.metrics.put_local_error.add(1);
                Err(e)
            }
        }
    }

    fn make_key(&self, hash: &str) -> String {
        join_key(&[&self.key_prefix, "module", &hash[..2], hash])
    }

    /// Local path for `hash`, creating the enclosing directory
    async fn make_path(&self, hash: &str) -> StratusResult<PathBuf> {
        let dir = self.root.join(&hash[..2]);
        if let Err(e) = fs::create_dir_all(&dir).await {
            self.metrics.path_error.add(1);
            return Err(StratusError::io(
                format!("creating directory {}", dir.display()),
                e,
            ));
        }
        Ok(dir.join(hash))
    }

    fn vlog(&self, line: String) {
        if self.log_requests {
            debug!("{}", line);
        }
    }
}

/// Storage identity of a module name
pub fn hash_name(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

fn err_label<T>(result: &StratusResult<T>) -> String {
    match result {
        Ok(_) => "none".to_string(),
        Err(e) => e.to_string(),
    }
}
