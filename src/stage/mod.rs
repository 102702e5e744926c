//! Local staging directory
//!
//! The stage mirrors remote objects as local files so the toolchain can read
//! cache entries directly off disk. Records are partitioned the same way as
//! remote keys, under the stage root:
//!
//! ```text
//! <root>/action/<hh>/<action-id>   action record ("<output-id> <nanos>")
//! <root>/output/<hh>/<output-id>   raw object body
//! ```
//!
//! where `<hh>` is the first two hex characters of the id. All writes go to
//! a sibling temp path first and are renamed into place, so a concurrent
//! reader never observes a partial file. The stage is a cache of the remote
//! store: entries may be swept by age at any time.

pub mod record;

pub use record::ActionRecord;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::error::{StratusError, StratusResult};
use crate::remote::ByteStream;
use crate::stage::record::is_hex_id;

/// A build cache record to be staged locally
pub struct Object {
    /// Opaque hex id of the action
    pub action_id: String,
    /// Content-addressed hex id of the output
    pub output_id: String,
    /// Size of the body in bytes
    pub size: u64,
    /// The object body
    pub body: ByteStream,
    /// Modification time to stamp on the staged file, if known
    pub mod_time: Option<DateTime<Utc>>,
}

/// File and byte totals for a directory tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageUsage {
    /// Number of regular files
    pub files: u64,
    /// Total bytes across those files
    pub bytes: u64,
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write `data` to `path` atomically, creating parent directories
///
/// Streams into a uniquely named sibling temp file and renames on success,
/// removing the temp file on failure. Returns the number of bytes written.
pub async fn write_atomic(
    path: &Path,
    mut data: impl AsyncRead + Send + Unpin,
) -> StratusResult<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StratusError::io(format!("creating directory {}", parent.display()), e))?;
    }

    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp{}-{}", std::process::id(), seq));
    let tmp = PathBuf::from(tmp);

    let result = async {
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| StratusError::io(format!("creating temp file {}", tmp.display()), e))?;
        let written = tokio::io::copy(&mut data, &mut file)
            .await
            .map_err(|e| StratusError::io(format!("writing temp file {}", tmp.display()), e))?;
        file.sync_all()
            .await
            .map_err(|e| StratusError::io(format!("flushing temp file {}", tmp.display()), e))?;
        drop(file);
        fs::rename(&tmp, path)
            .await
            .map_err(|e| StratusError::io(format!("renaming into {}", path.display()), e))?;
        Ok(written)
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

/// Content-addressed staging directory for build cache records
#[derive(Debug, Clone)]
pub struct Stage {
    root: PathBuf,
}

impl Stage {
    /// Open a stage rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> StratusResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StratusError::io(format!("creating stage root {}", root.display()), e))?;
        Ok(Self { root })
    }

    /// The stage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up an action record, returning the output id and its local path
    ///
    /// An absent action, or an action whose output file is gone (e.g. swept
    /// by cleanup), reports a miss as `Ok(None)`. Other IO failures are
    /// surfaced as errors.
    pub async fn get(&self, action_id: &str) -> StratusResult<Option<(String, PathBuf)>> {
        if !is_hex_id(action_id) {
            return Err(StratusError::InvalidId(action_id.to_string()));
        }

        let action_path = self.record_path("action", action_id);
        let data = match fs::read(&action_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StratusError::io(
                    format!("reading action {}", action_path.display()),
                    e,
                ))
            }
        };
        let record = ActionRecord::parse(&data)?;

        let output_path = self.record_path("output", &record.output_id);
        match fs::metadata(&output_path).await {
            Ok(_) => Ok(Some((record.output_id, output_path))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StratusError::io(
                format!("reading output {}", output_path.display()),
                e,
            )),
        }
    }

    /// Stage an object and its action record, returning the output's path
    ///
    /// The body lands before the action record so a concurrent `get` never
    /// finds an action pointing at a missing local file.
    pub async fn put(&self, obj: Object) -> StratusResult<PathBuf> {
        if !is_hex_id(&obj.action_id) {
            return Err(StratusError::InvalidId(obj.action_id));
        }
        if !is_hex_id(&obj.output_id) {
            return Err(StratusError::InvalidId(obj.output_id));
        }

        let output_path = self.record_path("output", &obj.output_id);
        write_atomic(&output_path, obj.body).await?;

        let mod_time = obj.mod_time.unwrap_or_else(Utc::now);
        if obj.mod_time.is_some() {
            filetime::set_file_mtime(&output_path, FileTime::from_system_time(mod_time.into()))
                .map_err(|e| {
                    StratusError::io(format!("stamping mtime on {}", output_path.display()), e)
                })?;
        }

        let record = ActionRecord::new(&obj.output_id, mod_time);
        let action_path = self.record_path("action", &obj.action_id);
        write_atomic(&action_path, record.encode().as_bytes()).await?;

        Ok(output_path)
    }

    /// Delete staged files older than `max_age`, returning how many went
    ///
    /// Sweeps the whole stage root, so adapter subtrees (e.g. the module
    /// cache) sharing the root are reclaimed too. Individual failures are
    /// logged and skipped; the sweep keeps going.
    pub async fn cleanup(&self, max_age: Duration) -> StratusResult<u64> {
        let cutoff = SystemTime::now() - max_age;
        let mut removed = 0u64;

        for path in walk_files(&self.root).await? {
            let modified = match fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!("stat {} during cleanup: {} (skipping)", path.display(), e);
                    continue;
                }
            };
            if modified < cutoff {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("remove {} during cleanup: {}", path.display(), e),
                }
            }
        }

        debug!("stage cleanup removed {} files", removed);
        Ok(removed)
    }

    /// Report file and byte totals for the stage
    pub async fn usage(&self) -> StratusResult<StageUsage> {
        let mut usage = StageUsage::default();
        for path in walk_files(&self.root).await? {
            if let Ok(meta) = fs::metadata(&path).await {
                usage.files += 1;
                usage.bytes += meta.len();
            }
        }
        Ok(usage)
    }

    fn record_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(kind).join(&id[..2]).join(id)
    }
}

/// Collect every regular file under `root`
async fn walk_files(root: &Path) -> StratusResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StratusError::io(format!("reading {}", dir.display()), e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StratusError::io(format!("reading entry in {}", dir.display()), e))?
        {
            let ty = entry
                .file_type()
                .await
                .map_err(|e| StratusError::io("reading entry type", e))?;
            if ty.is_dir() {
                dirs.push(entry.path());
            } else if ty.is_file() {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}
