//! The cluster replay log (spec §4.I): every relayed event is appended
//! to an on-disk, netstring-framed segment file under
//! `<state>/api/log/`, so a peer that drops and reconnects can be caught
//! up on everything it missed instead of the cluster needing full
//! resync. Segments rotate by message count or age; old ones are pruned
//! once they age out of the retention window.
//!
//! Storage is intentionally dumb: this crate doesn't know about zones or
//! ACLs. `catch_up` takes a caller-supplied predicate so `relay` (which
//! does know the zone tree) decides what a given peer is allowed to see.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cluster_protocol::ReplayRecord;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Rotate the active segment once it holds this many messages.
pub const ROTATE_AT_MESSAGES: usize = 50_000;
/// ...or once it's been open this long, whichever comes first.
pub const ROTATE_INTERVAL: Duration = Duration::from_secs(3600);
/// How long a rotated segment is kept before `prune` deletes it.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[derive(Debug)]
pub enum ReplayLogError {
    Io(std::io::Error),
    Encode(serde_json::Error),
    Framing(cluster_tls::FramedError),
}

impl std::fmt::Display for ReplayLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayLogError::Io(e) => write!(f, "replay log io error: {e}"),
            ReplayLogError::Encode(e) => write!(f, "replay log encode error: {e}"),
            ReplayLogError::Framing(e) => write!(f, "replay log framing error: {e}"),
        }
    }
}
impl std::error::Error for ReplayLogError {}
impl From<std::io::Error> for ReplayLogError {
    fn from(e: std::io::Error) -> Self {
        ReplayLogError::Io(e)
    }
}
impl From<serde_json::Error> for ReplayLogError {
    fn from(e: serde_json::Error) -> Self {
        ReplayLogError::Encode(e)
    }
}
impl From<cluster_tls::FramedError> for ReplayLogError {
    fn from(e: cluster_tls::FramedError) -> Self {
        ReplayLogError::Framing(e)
    }
}

struct ActiveSegment {
    file: File,
    message_count: usize,
    opened_at: f64,
}

pub struct ReplayLog {
    dir: PathBuf,
    active: Mutex<ActiveSegment>,
}

fn current_path(dir: &Path) -> PathBuf {
    dir.join("current")
}

impl ReplayLog {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, ReplayLogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let file = OpenOptions::new().create(true).append(true).open(current_path(&dir)).await?;
        Ok(ReplayLog {
            dir,
            active: Mutex::new(ActiveSegment {
                file,
                message_count: 0,
                opened_at: now(),
            }),
        })
    }

    /// Append one record, rotating the segment first if it's full or
    /// stale.
    pub async fn append(&self, record: &ReplayRecord) -> Result<(), ReplayLogError> {
        let payload = serde_json::to_vec(record)?;
        let mut active = self.active.lock().await;
        if active.message_count >= ROTATE_AT_MESSAGES || now() - active.opened_at >= ROTATE_INTERVAL.as_secs_f64() {
            self.rotate_locked(&mut active).await?;
        }
        cluster_tls::write_netstring(&mut active.file, &payload).await?;
        active.message_count += 1;
        Ok(())
    }

    async fn rotate_locked(&self, active: &mut ActiveSegment) -> Result<(), ReplayLogError> {
        active.file.flush().await?;
        let segment_name = segment_file_name(now());
        fs::rename(current_path(&self.dir), self.dir.join(&segment_name)).await?;
        active.file = OpenOptions::new().create(true).append(true).open(current_path(&self.dir)).await?;
        active.message_count = 0;
        active.opened_at = now();
        Ok(())
    }

    pub async fn rotate(&self) -> Result<(), ReplayLogError> {
        let mut active = self.active.lock().await;
        self.rotate_locked(&mut active).await
    }

    /// Read every record across every segment (oldest first) whose
    /// `timestamp` is strictly greater than `since`, keeping only the
    /// ones `allow` accepts.
    pub async fn catch_up(&self, since: f64, allow: impl Fn(&ReplayRecord) -> bool) -> Result<Vec<ReplayRecord>, ReplayLogError> {
        let mut segment_paths = self.rotated_segments().await?;
        segment_paths.push(current_path(&self.dir));

        let mut out = Vec::new();
        for path in segment_paths {
            let Ok(mut file) = File::open(&path).await else { continue };
            loop {
                match cluster_tls::read_netstring(&mut file).await {
                    Ok(Some(bytes)) => {
                        let record: ReplayRecord = serde_json::from_slice(&bytes)?;
                        if record.timestamp > since && allow(&record) {
                            out.push(record);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping corrupt replay segment tail");
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Delete rotated segments whose close time is older than
    /// `retention`. Never touches `current`.
    pub async fn prune(&self, retention: Duration) -> Result<usize, ReplayLogError> {
        let cutoff = now() - retention.as_secs_f64();
        let mut removed = 0;
        for path in self.rotated_segments().await? {
            let Some(stamp) = segment_timestamp(&path) else { continue };
            if stamp < cutoff {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn rotated_segments(&self) -> Result<Vec<PathBuf>, ReplayLogError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut segments = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some("current") {
                continue;
            }
            if segment_timestamp(&path).is_some() {
                segments.push(path);
            }
        }
        segments.sort();
        Ok(segments)
    }
}

fn segment_file_name(closed_at: f64) -> String {
    format!("{}", closed_at as i64)
}

fn segment_timestamp(path: &Path) -> Option<f64> {
    let name = path.file_name()?.to_str()?;
    let secs: i64 = name.parse().ok()?;
    Some(secs as f64)
}
