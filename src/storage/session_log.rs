use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::Mutex,
};
use tracing::{debug, info, warn};

use crate::fs::operations::ensure_trailing_newline;

use super::entities::SessionEntry;

pub const LOG_FILE_NAME: &str = "sessions.jsonl";

/// Interface for abstracting storage of finished sessions.
pub trait SessionLog {
    /// Adds a session at the end of the log. Only fails if the underlying storage does.
    fn append(&self, entry: &SessionEntry) -> impl Future<Output = Result<()>> + Send;

    /// Every stored session, most recent start first.
    fn load_all(&self) -> impl Future<Output = Result<Vec<SessionEntry>>> + Send;

    /// Irreversibly drops every stored session.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Deref + Sync> SessionLog for T
where
    T::Target: SessionLog,
{
    fn append(&self, entry: &SessionEntry) -> impl Future<Output = Result<()>> + Send {
        self.deref().append(entry)
    }

    fn load_all(&self) -> impl Future<Output = Result<Vec<SessionEntry>>> + Send {
        self.deref().load_all()
    }

    fn clear(&self) -> impl Future<Output = Result<()>> + Send {
        self.deref().clear()
    }
}

/// The main realization of [SessionLog]: a newline-delimited JSON file.
pub struct SessionLogImpl {
    path: PathBuf,
    /// Serializes writers inside the process. The file lock does the same across processes.
    writer: Mutex<()>,
}

impl SessionLogImpl {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path,
            writer: Mutex::new(()),
        })
    }

    /// Log stored under the default file name inside `dir`.
    pub fn in_dir(dir: &Path) -> Result<Self, std::io::Error> {
        Self::new(dir.join(LOG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append_with_file(file: &mut File, line: &[u8]) -> Result<()> {
        if ensure_trailing_newline(file).await? {
            warn!("Last session record was cut off, starting a new line");
        }
        file.write_all(line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_inner(&self) -> Result<Vec<SessionEntry>, std::io::Error> {
        debug!("Extracting {:?}", self.path);
        let mut file = File::open(&self.path).await?;
        file.lock_shared()?;
        let result = Self::read_sessions(&mut file, &self.path).await;
        file.unlock_async().await?;
        result
    }

    async fn read_sessions(
        file: &mut File,
        path: &Path,
    ) -> Result<Vec<SessionEntry>, std::io::Error> {
        let mut segments = BufReader::new(file).split(b'\n');
        let mut sessions = vec![];
        while let Some(line) = segments.next_segment().await? {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<SessionEntry>(&line) {
                Ok(entry) if entry.is_well_formed() => sessions.push(entry),
                Ok(entry) => {
                    warn!("Skipping impossible session {:?}", entry)
                }
                Err(e) => {
                    // Might happen if a write got interrupted.
                    warn!(
                        "Skipping illegal json string in {:?} {}: {e}",
                        path,
                        String::from_utf8_lossy(&line)
                    )
                }
            }
        }
        Ok(sessions)
    }
}

impl SessionLog for SessionLogImpl {
    async fn append(&self, entry: &SessionEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _writer = self.writer.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        file.lock_exclusive()?;
        let result = Self::append_with_file(&mut file, &line).await;
        file.unlock_async().await?;
        result
    }

    async fn load_all(&self) -> Result<Vec<SessionEntry>> {
        let mut sessions = match self.load_inner().await {
            Ok(sessions) => sessions,
            Err(e) if e.kind() == ErrorKind::NotFound => vec![],
            Err(e) => Err(e)?,
        };
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    async fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed session log {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        storage::{
            entities::SessionEntry,
            session_log::{SessionLog, SessionLogImpl},
        },
        utils::logging::TEST_LOGGING,
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    fn session(name: &str, offset_minutes: i64, seconds: u64) -> SessionEntry {
        let start_time = start() + Duration::minutes(offset_minutes);
        SessionEntry {
            task_name: name.into(),
            duration_seconds: seconds,
            start_time,
            end_time: start_time + Duration::seconds(seconds as i64),
            date: start_time.date_naive(),
        }
    }

    #[tokio::test]
    async fn test_missing_log_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let log = SessionLogImpl::in_dir(dir.path())?;

        assert!(log.load_all().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_round_trip_most_recent_first() -> Result<()> {
        let dir = tempdir()?;
        let log = SessionLogImpl::in_dir(dir.path())?;
        let sessions = [
            session("Writing", 0, 65),
            session("Reading", 30, 10),
            session("Writing", 10, 20),
        ];
        for entry in &sessions {
            log.append(entry).await?;
        }

        let stored = log.load_all().await?;

        assert_eq!(
            stored,
            vec![sessions[1].clone(), sessions[2].clone(), sessions[0].clone()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_creates_missing_directories() -> Result<()> {
        let dir = tempdir()?;
        let log = SessionLogImpl::new(dir.path().join("nested/deeper/sessions.jsonl"))?;
        std::fs::remove_dir_all(dir.path().join("nested"))?;

        log.append(&session("Writing", 0, 5)).await?;

        assert_eq!(log.load_all().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let log = SessionLogImpl::in_dir(dir.path())?;
        let first = session("Writing", 0, 65);
        let second = session("Reading", 5, 7);

        let mut contents = serde_json::to_string(&first)?;
        contents += "\nnot json at all\n\n";
        contents += r#"{"task_name":"Zero","duration_seconds":0,"start_time":"2018-07-04T00:00:00Z","end_time":"2018-07-04T00:00:00Z","date":"2018-07-04"}"#;
        contents += "\n";
        contents += &serde_json::to_string(&second)?;
        contents += "\n";
        std::fs::write(log.path(), contents)?;

        assert_eq!(log.load_all().await?, vec![second, first]);
        Ok(())
    }

    #[tokio::test]
    async fn test_torn_record_does_not_swallow_next() -> Result<()> {
        let dir = tempdir()?;
        let log = SessionLogImpl::in_dir(dir.path())?;
        let first = session("Writing", 0, 65);
        let mut contents = serde_json::to_string(&first)?;
        contents += "\n{\"task_name\":\"Cut";
        std::fs::write(log.path(), contents)?;

        let next = session("Reading", 5, 7);
        log.append(&next).await?;

        assert_eq!(log.load_all().await?, vec![next, first]);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let log = SessionLogImpl::in_dir(dir.path())?;
        log.append(&session("Writing", 0, 65)).await?;

        log.clear().await?;
        assert!(log.load_all().await?.is_empty());

        log.clear().await?;
        assert!(log.load_all().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_failure_surfaced() -> Result<()> {
        let dir = tempdir()?;
        let log = SessionLogImpl::in_dir(dir.path())?;
        std::fs::create_dir(log.path())?;

        assert!(log.clear().await.is_err());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_do_not_interleave() -> Result<()> {
        let dir = tempdir()?;
        let log = Arc::new(SessionLogImpl::in_dir(dir.path())?);

        let handles = (0..24)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move {
                    log.append(&session(&format!("task {i}"), i, i as u64 + 1))
                        .await
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await??;
        }

        let stored = log.load_all().await?;
        assert_eq!(stored.len(), 24);
        assert_eq!(stored[0].task_name.as_ref(), "task 23");
        Ok(())
    }
}
