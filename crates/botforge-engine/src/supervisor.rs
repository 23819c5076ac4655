use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::Arc,
    time::Duration,
};

use botforge_instance::{InstanceId, InstanceState, InstanceStatus};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::Mutex,
};

use crate::error::{Error, Result};
use crate::paths::env_u64;
use crate::templates::RuntimeSpec;

const DEFAULT_LOG_MAX_LINES: usize = 1000;
const DEFAULT_STOP_GRACE_MS: u64 = 5000;

#[cfg(unix)]
use libc::{SIGKILL, SIGTERM};
#[cfg(not(unix))]
const SIGTERM: i32 = 15;
#[cfg(not(unix))]
const SIGKILL: i32 = 9;

fn log_max_lines() -> usize {
    env_u64("BOTFORGE_LOG_MAX_LINES")
        .map(|v| v.clamp(100, 50_000) as usize)
        .unwrap_or(DEFAULT_LOG_MAX_LINES)
}

fn stop_grace() -> Duration {
    Duration::from_millis(
        env_u64("BOTFORGE_STOP_GRACE_MS")
            .map(|v| v.clamp(100, 60_000))
            .unwrap_or(DEFAULT_STOP_GRACE_MS),
    )
}

fn unix_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Bounded per-instance output buffer. Eviction is counted rather than
/// blocking the producer; the child never waits on a slow observer.
#[derive(Debug)]
pub struct LogBuffer {
    next_seq: u64,
    max_lines: usize,
    lines: VecDeque<(u64, String)>,
    dropped: u64,
}

impl LogBuffer {
    fn new(max_lines: usize) -> Self {
        Self {
            next_seq: 1,
            max_lines,
            lines: VecDeque::new(),
            dropped: 0,
        }
    }

    fn push_line(&mut self, line: String) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.lines.push_back((seq, line));
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
    }

    fn tail_after(&self, cursor: u64, limit: usize) -> (Vec<String>, u64) {
        // Cursor 0 means "give me the most recent lines".
        if cursor == 0 {
            let start = self.lines.len().saturating_sub(limit);
            let mut out = Vec::new();
            let mut last = 0;
            for (seq, line) in self.lines.iter().skip(start) {
                out.push(line.clone());
                last = *seq;
            }
            return (out, last);
        }

        let mut out = Vec::new();
        let mut last = cursor;
        for (seq, line) in self.lines.iter() {
            if *seq > cursor {
                out.push(line.clone());
                last = *seq;
                if out.len() >= limit {
                    break;
                }
            }
        }
        (out, last)
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(log_max_lines())
    }
}

/// Observability sink for one instance: buffered for `tail_logs`, mirrored
/// to tracing tagged with the instance id.
#[derive(Clone)]
struct LogSink {
    instance_id: String,
    buffer: Arc<Mutex<LogBuffer>>,
}

impl LogSink {
    async fn emit(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(instance_id = %self.instance_id, "{line}");
        self.buffer.lock().await.push_line(line);
    }
}

#[derive(Debug)]
struct BotEntry {
    template_id: String,
    state: InstanceState,
    pid: Option<u32>,
    pgid: Option<i32>,
    started_at_unix_ms: u64,
    message: Option<String>,
    logs: Arc<Mutex<LogBuffer>>,
}

impl BotEntry {
    fn status(&self, instance_id: &str) -> InstanceStatus {
        InstanceStatus {
            instance_id: InstanceId(instance_id.to_string()),
            template_id: self.template_id.clone(),
            state: self.state,
            pid: self.pid,
            exit_code: None,
            started_at_unix_ms: self.started_at_unix_ms,
            message: self.message.clone(),
        }
    }
}

#[cfg(target_os = "linux")]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    // If the supervisor dies, the child goes with it rather than orphaning.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn kill_group(pgid: i32, signal: i32) {
    unsafe {
        libc::kill(-pgid, signal);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: i32, _signal: i32) {}

/// The live registry of supervised instances. One mutex serializes the
/// request path, the stream-consumer tasks, and the exit task.
#[derive(Clone, Debug, Default)]
pub struct Supervisor {
    inner: Arc<Mutex<HashMap<String, BotEntry>>>,
}

impl Supervisor {
    /// Spawn `runtime` inside `tree_dir` and register the instance.
    ///
    /// The secret token and prefix travel only through the child's
    /// environment (`BOT_TOKEN`, `PREFIX`): never argv, never disk.
    pub async fn start(
        &self,
        instance_id: &str,
        template_id: &str,
        tree_dir: &Path,
        runtime: RuntimeSpec,
        secret_token: &str,
        command_prefix: &str,
    ) -> Result<InstanceStatus> {
        if tokio::fs::metadata(tree_dir).await.is_err() {
            return Err(Error::not_found(format!(
                "source tree: {}",
                tree_dir.display()
            )));
        }

        let logs: Arc<Mutex<LogBuffer>> = Arc::new(Mutex::new(LogBuffer::default()));
        {
            let mut inner = self.inner.lock().await;
            if let Some(existing) = inner.get(instance_id)
                && existing.state.is_live()
            {
                return Err(Error::AlreadyRunning(instance_id.to_string()));
            }
            inner.remove(instance_id);
            inner.insert(
                instance_id.to_string(),
                BotEntry {
                    template_id: template_id.to_string(),
                    state: InstanceState::Starting,
                    pid: None,
                    pgid: None,
                    started_at_unix_ms: unix_ms_now(),
                    message: Some("starting...".to_string()),
                    logs: logs.clone(),
                },
            );
        }

        let sink = LogSink {
            instance_id: instance_id.to_string(),
            buffer: logs.clone(),
        };
        sink.emit(format!(
            "[botforge] start requested: template_id={template_id} instance_id={instance_id}"
        ))
        .await;

        let mut cmd = Command::new(runtime.program);
        cmd.args(runtime.args)
            .current_dir(tree_dir)
            .env("BOT_TOKEN", secret_token)
            .env("PREFIX", command_prefix)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    // Start a new session so the whole process tree can be signaled.
                    set_parent_death_signal()?;
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.inner.lock().await.remove(instance_id);
                sink.emit(format!("[botforge] spawn failed: {e}")).await;
                return Err(Error::SpawnFailed(e));
            }
        };
        let pid = child.id();
        let pgid = pid.map(|p| p as i32);

        tracing::info!(
            instance_id,
            template_id,
            pid,
            program = runtime.program,
            "instance spawned"
        );

        // Spawn success is readiness: no wait for the child's own signal.
        let status = {
            let mut inner = self.inner.lock().await;
            let Some(e) = inner.get_mut(instance_id) else {
                // A racing stop beat us to the registry; tear the child down.
                if let Some(pgid) = pgid {
                    kill_group(pgid, SIGTERM);
                }
                return Err(Error::not_found(format!("instance: {instance_id}")));
            };
            e.state = InstanceState::Running;
            e.pid = pid;
            e.pgid = pgid;
            e.message = None;
            e.status(instance_id)
        };

        if let Some(out) = child.stdout.take() {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink.emit(format!("[stdout] {line}")).await;
                }
            });
        }
        if let Some(err) = child.stderr.take() {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink.emit(format!("[stderr] {line}")).await;
                }
            });
        }

        // Exit task: reap the child and release the slot.
        let inner = self.inner.clone();
        let id = instance_id.to_string();
        let exit_sink = sink.clone();
        tokio::spawn(async move {
            let res = child.wait().await;
            let exit_code = res.as_ref().ok().and_then(|s| s.code());

            let final_state = {
                let mut map = inner.lock().await;
                match map.get(&id) {
                    Some(e) if e.pid == pid => {
                        // Still registered: nobody asked for this exit.
                        map.remove(&id);
                        InstanceState::Crashed
                    }
                    // Entry already removed by stop(), or superseded by a
                    // later start; either way this child's slot is gone.
                    _ => InstanceState::Stopped,
                }
            };

            exit_sink
                .emit(format!(
                    "[botforge] instance exited: state={final_state:?} exit_code={exit_code:?}"
                ))
                .await;
            tracing::info!(
                instance_id = %id,
                ?final_state,
                exit_code,
                "instance exited"
            );
        });

        Ok(status)
    }

    /// Signal termination and free the slot. Safe against the exit task
    /// racing to do the same removal; a second stop reports `NotFound`.
    pub async fn stop(&self, instance_id: &str) -> Result<()> {
        let (pgid, logs) = {
            let mut inner = self.inner.lock().await;
            let Some(e) = inner.remove(instance_id) else {
                return Err(Error::not_found(format!("instance: {instance_id}")));
            };
            (e.pgid, e.logs)
        };

        logs.lock()
            .await
            .push_line("[botforge] stop requested".to_string());
        tracing::info!(instance_id, "stop requested");

        if let Some(pgid) = pgid {
            kill_group(pgid, SIGTERM);

            // Escalate after the grace window; a no-op if the group is gone.
            let grace = stop_grace();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                kill_group(pgid, SIGKILL);
            });
        }

        Ok(())
    }

    pub async fn status(&self, instance_id: &str) -> Option<InstanceStatus> {
        let inner = self.inner.lock().await;
        inner.get(instance_id).map(|e| e.status(instance_id))
    }

    pub async fn list(&self) -> Vec<InstanceStatus> {
        let inner = self.inner.lock().await;
        inner.iter().map(|(id, e)| e.status(id)).collect()
    }

    /// Read forwarded child output. Cursor semantics follow `LogBuffer`:
    /// 0 tails the most recent lines, otherwise lines after the cursor.
    pub async fn tail_logs(
        &self,
        instance_id: &str,
        cursor: u64,
        limit: usize,
    ) -> Result<(Vec<String>, u64)> {
        let logs = {
            let inner = self.inner.lock().await;
            let e = inner
                .get(instance_id)
                .ok_or_else(|| Error::not_found(format!("instance: {instance_id}")))?;
            e.logs.clone()
        };

        let guard = logs.lock().await;
        Ok(guard.tail_after(cursor, limit))
    }

    /// Lines evicted from the bounded buffer before anyone read them.
    pub async fn dropped_lines(&self, instance_id: &str) -> Result<u64> {
        let logs = {
            let inner = self.inner.lock().await;
            let e = inner
                .get(instance_id)
                .ok_or_else(|| Error::not_found(format!("instance: {instance_id}")))?;
            e.logs.clone()
        };

        let guard = logs.lock().await;
        Ok(guard.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_evicts_and_counts() {
        let mut buf = LogBuffer::new(5);
        for i in 0..8 {
            buf.push_line(format!("line {i}"));
        }
        assert_eq!(buf.lines.len(), 5);
        assert_eq!(buf.dropped, 3);

        let (lines, cursor) = buf.tail_after(0, 10);
        assert_eq!(lines.first().map(String::as_str), Some("line 3"));
        assert_eq!(lines.last().map(String::as_str), Some("line 7"));
        assert_eq!(cursor, 8);
    }

    #[test]
    fn log_buffer_cursor_resumes_where_it_left_off() {
        let mut buf = LogBuffer::new(100);
        buf.push_line("a".to_string());
        buf.push_line("b".to_string());
        let (lines, cursor) = buf.tail_after(0, 10);
        assert_eq!(lines, vec!["a", "b"]);

        buf.push_line("c".to_string());
        let (lines, _) = buf.tail_after(cursor, 10);
        assert_eq!(lines, vec!["c"]);
    }

    #[cfg(unix)]
    mod process {
        use super::super::*;

        const SH: RuntimeSpec = RuntimeSpec {
            program: "/bin/sh",
            args: &["entry.sh"],
        };

        fn scratch_tree(script: &str) -> tempfile::TempDir {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("entry.sh"), script).unwrap();
            dir
        }

        async fn wait_until_absent(sup: &Supervisor, id: &str) -> bool {
            for _ in 0..200 {
                if sup.status(id).await.is_none() {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            false
        }

        #[tokio::test]
        async fn start_with_missing_tree_is_not_found() {
            let sup = Supervisor::default();
            let err = sup
                .start("gone", "fun", Path::new("/nonexistent/tree"), SH, "x", "!")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NotFound(_)));
            assert!(sup.list().await.is_empty());
        }

        #[tokio::test]
        async fn spawn_failure_leaves_no_entry() {
            let tree = scratch_tree("sleep 30\n");
            let sup = Supervisor::default();
            let bad = RuntimeSpec {
                program: "/nonexistent/program",
                args: &[],
            };
            let err = sup
                .start("bad", "fun", tree.path(), bad, "x", "!")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::SpawnFailed(_)));
            assert!(sup.status("bad").await.is_none());
        }

        #[tokio::test]
        async fn lifecycle_start_duplicate_stop_restop() {
            let tree = scratch_tree("sleep 30\n");
            let sup = Supervisor::default();

            let status = sup
                .start("bot-1", "fun", tree.path(), SH, "tok", "!")
                .await
                .unwrap();
            assert_eq!(status.state, InstanceState::Running);
            assert!(status.pid.is_some());

            let first_started_at = sup.status("bot-1").await.unwrap().started_at_unix_ms;

            let err = sup
                .start("bot-1", "fun", tree.path(), SH, "tok", "!")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::AlreadyRunning(_)));
            assert_eq!(
                sup.status("bot-1").await.unwrap().started_at_unix_ms,
                first_started_at
            );

            sup.stop("bot-1").await.unwrap();
            assert!(sup.status("bot-1").await.is_none());

            let err = sup.stop("bot-1").await.unwrap_err();
            assert!(matches!(err, Error::NotFound(_)));
        }

        #[tokio::test]
        async fn external_kill_releases_the_slot() {
            let tree = scratch_tree("sleep 30\n");
            let sup = Supervisor::default();

            let status = sup
                .start("bot-2", "fun", tree.path(), SH, "tok", "!")
                .await
                .unwrap();
            let pid = status.pid.unwrap() as i32;
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }

            assert!(wait_until_absent(&sup, "bot-2").await);
            assert!(sup.list().await.iter().all(|s| s.instance_id.0 != "bot-2"));

            // The slot is free for a fresh start with the same id.
            sup.start("bot-2", "fun", tree.path(), SH, "tok", "!")
                .await
                .unwrap();
            sup.stop("bot-2").await.unwrap();
        }

        #[tokio::test]
        async fn child_stdout_is_forwarded_to_the_log_buffer() {
            let tree = scratch_tree("echo hello from the bot\nsleep 30\n");
            let sup = Supervisor::default();
            sup.start("bot-3", "fun", tree.path(), SH, "tok", "!")
                .await
                .unwrap();

            let mut seen = false;
            for _ in 0..100 {
                let (lines, _) = sup.tail_logs("bot-3", 0, 100).await.unwrap();
                if lines.iter().any(|l| l.contains("[stdout] hello from the bot")) {
                    seen = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            assert!(seen, "stdout line never reached the buffer");
            assert_eq!(sup.dropped_lines("bot-3").await.unwrap(), 0);

            sup.stop("bot-3").await.unwrap();
        }

        #[tokio::test]
        async fn env_carries_token_and_prefix() {
            // The child proves it received both variables by echoing them.
            let tree = scratch_tree("echo token=$BOT_TOKEN prefix=$PREFIX\nsleep 30\n");
            let sup = Supervisor::default();
            sup.start("bot-4", "fun", tree.path(), SH, "sekrit", "?")
                .await
                .unwrap();

            let mut seen = false;
            for _ in 0..100 {
                let (lines, _) = sup.tail_logs("bot-4", 0, 100).await.unwrap();
                if lines.iter().any(|l| l.contains("token=sekrit prefix=?")) {
                    seen = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            assert!(seen);

            sup.stop("bot-4").await.unwrap();
        }
    }
}
