//! In-memory collaborators for integration tests.

#![allow(dead_code)]

use pitr_common::backrest::{BackupKind, BackupTool};
use pitr_common::cluster::ClusterManager;
use pitr_common::exec::CommandError;
use pitr_common::pgdata::PG_VERSION_FILE;
use pitr_common::postgres::{PostgresControl, ProcessStatus, StopMode};
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;

pub type CallLog = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.borrow().clone()
}

fn exit_error(program: &str, output: &str) -> CommandError {
    CommandError::Exit {
        program: program.to_string(),
        code: 1,
        output: output.to_string(),
    }
}

pub struct FakeCluster {
    pub active: bool,
    /// Stopping the cluster manager takes PostgreSQL down with it
    pub stops_pg: bool,
    pub fail_stop: bool,
    pub pg_running: Rc<Cell<bool>>,
    pub log: CallLog,
}

impl ClusterManager for FakeCluster {
    fn name(&self) -> &str {
        "patroni"
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn stop(&self) -> Result<(), CommandError> {
        self.log.borrow_mut().push("cluster.stop".to_string());
        if self.fail_stop {
            return Err(exit_error("systemctl", "Failed to stop patroni.service"));
        }
        if self.stops_pg {
            self.pg_running.set(false);
        }
        Ok(())
    }
}

pub struct FakePg {
    pub running: Rc<Cell<bool>>,
    pub pid: i32,
    /// Fast attempts before the process exits, `None` never
    pub fast_attempts_needed: Option<u32>,
    /// Fast stop reports an error even when it worked
    pub fast_errors: bool,
    pub immediate_works: bool,
    pub kill_works: bool,
    pub start_fails: bool,
    pub start_comes_up: bool,
    pub fast_calls: Cell<u32>,
    pub checks: Cell<u32>,
    /// When each stop was issued, on the tokio clock
    pub stop_times: RefCell<Vec<Instant>>,
    pub log: CallLog,
}

impl FakePg {
    pub fn new(running: Rc<Cell<bool>>, log: CallLog) -> Self {
        Self {
            running,
            pid: 4242,
            fast_attempts_needed: Some(1),
            fast_errors: false,
            immediate_works: true,
            kill_works: true,
            start_fails: false,
            start_comes_up: true,
            fast_calls: Cell::new(0),
            checks: Cell::new(0),
            stop_times: RefCell::new(Vec::new()),
            log,
        }
    }
}

impl PostgresControl for FakePg {
    fn check_running(&self) -> ProcessStatus {
        self.checks.set(self.checks.get() + 1);
        if self.running.get() {
            ProcessStatus::running(self.pid)
        } else {
            ProcessStatus::stopped()
        }
    }

    fn stop(&self, mode: StopMode, _timeout: Duration) -> Result<(), CommandError> {
        self.log.borrow_mut().push(format!("pg.stop {}", mode.as_str()));
        self.stop_times.borrow_mut().push(Instant::now());
        match mode {
            StopMode::Fast | StopMode::Smart => {
                let n = self.fast_calls.get() + 1;
                self.fast_calls.set(n);
                if self.fast_attempts_needed.is_some_and(|need| n >= need) {
                    self.running.set(false);
                }
                if self.fast_errors {
                    return Err(exit_error("pg_ctl", "server does not shut down"));
                }
            }
            StopMode::Immediate => {
                if self.immediate_works {
                    self.running.set(false);
                }
            }
        }
        Ok(())
    }

    fn start(&self, _timeout: Duration) -> Result<(), CommandError> {
        self.log.borrow_mut().push("pg.start".to_string());
        if self.start_fails {
            return Err(exit_error("pg_ctl", "could not start server"));
        }
        if self.start_comes_up {
            self.running.set(true);
        }
        Ok(())
    }

    fn promote(&self) -> Result<(), CommandError> {
        self.log.borrow_mut().push("pg.promote".to_string());
        Ok(())
    }

    fn force_kill(&self, pid: i32) -> Result<(), CommandError> {
        self.log.borrow_mut().push(format!("pg.kill {pid}"));
        if self.kill_works {
            self.running.set(false);
        }
        Ok(())
    }
}

pub struct FakeTool {
    pub failure: Option<String>,
    pub last_args: RefCell<Vec<String>>,
    pub log: CallLog,
}

impl FakeTool {
    pub fn ok(log: CallLog) -> Self {
        Self {
            failure: None,
            last_args: RefCell::new(Vec::new()),
            log,
        }
    }

    pub fn failing(log: CallLog, output: &str) -> Self {
        Self {
            failure: Some(output.to_string()),
            ..Self::ok(log)
        }
    }
}

impl BackupTool for FakeTool {
    fn restore(&self, args: &[String]) -> Result<String, CommandError> {
        self.log.borrow_mut().push("tool.restore".to_string());
        *self.last_args.borrow_mut() = args.to_vec();
        match &self.failure {
            Some(output) => Err(exit_error("pgbackrest", output)),
            None => Ok("restore command end: completed successfully".to_string()),
        }
    }

    fn backup(&self, kind: BackupKind) -> Result<String, CommandError> {
        self.log.borrow_mut().push(format!("tool.backup {}", kind.as_str()));
        Ok(String::new())
    }
}

/// Writer whose contents can be read back after it was boxed away
#[derive(Clone, Default)]
pub struct SharedBuf(pub Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails
pub struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }
}

/// A data directory that passes preflight and role checks
pub fn initialized_data_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(PG_VERSION_FILE), "16\n").unwrap();
    for name in [
        "base",
        "global",
        "pg_wal",
        "pg_xact",
        "pg_stat",
        "pg_tblspc",
        "pg_subtrans",
        "pg_multixact",
        "pg_logical",
    ] {
        std::fs::create_dir(dir.path().join(name)).unwrap();
    }
    dir
}
