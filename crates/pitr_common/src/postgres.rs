//! PostgreSQL server control through `pg_ctl`.

use crate::exec::{CommandError, ExecContext};
use crate::pgdata::{DataDirInspector, DbsuFs, PG_VERSION_FILE};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "/pg/data";

/// Lock file written by a running postmaster
pub const POSTMASTER_PID: &str = "postmaster.pid";

/// Fresh liveness reading of the server process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub running: bool,
    pub pid: Option<i32>,
}

impl ProcessStatus {
    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn running(pid: i32) -> Self {
        Self {
            running: true,
            pid: Some(pid),
        }
    }
}

/// `pg_ctl stop -m` modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Smart,
    Fast,
    Immediate,
}

impl StopMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StopMode::Smart => "smart",
            StopMode::Fast => "fast",
            StopMode::Immediate => "immediate",
        }
    }
}

/// Operations on the local server
pub trait PostgresControl {
    fn check_running(&self) -> ProcessStatus;
    fn stop(&self, mode: StopMode, timeout: Duration) -> Result<(), CommandError>;
    fn start(&self, timeout: Duration) -> Result<(), CommandError>;
    fn promote(&self) -> Result<(), CommandError>;
    fn force_kill(&self, pid: i32) -> Result<(), CommandError>;
}

/// Parse the pid from the first line of `postmaster.pid`
pub fn parse_postmaster_pid(contents: &str) -> Option<i32> {
    contents
        .lines()
        .next()
        .and_then(|l| l.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0)
}

/// Signal-0 probe. EPERM still means the process exists.
pub fn pid_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Locate a PostgreSQL client binary: configured bin dir, then well-known
/// install paths for the data directory's major version, then `PATH`.
pub fn locate_pg_bin(name: &str, bin_dir: Option<&Path>, major: Option<&str>) -> PathBuf {
    if let Some(dir) = bin_dir {
        return dir.join(name);
    }
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(v) = major {
        candidates.push(PathBuf::from(format!("/usr/pgsql-{v}/bin/{name}")));
        candidates.push(PathBuf::from(format!("/usr/lib/postgresql/{v}/bin/{name}")));
    }
    candidates.push(PathBuf::from(format!("/usr/pgsql/bin/{name}")));
    candidates
        .into_iter()
        .find(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

pub fn locate_pg_ctl(bin_dir: Option<&Path>, major: Option<&str>) -> PathBuf {
    locate_pg_bin("pg_ctl", bin_dir, major)
}

/// Real server control for one data directory
#[derive(Debug, Clone)]
pub struct PgCtl {
    ctx: ExecContext,
    data_dir: PathBuf,
    pg_ctl: PathBuf,
    bin_dir: Option<PathBuf>,
    major: Option<String>,
    fs: DbsuFs,
}

impl PgCtl {
    pub fn new(ctx: ExecContext, data_dir: PathBuf, bin_dir: Option<&Path>) -> Self {
        let fs = DbsuFs::new(ctx.clone());
        let major = fs
            .read(&data_dir.join(PG_VERSION_FILE))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let pg_ctl = locate_pg_ctl(bin_dir, major.as_deref());
        debug!("using {} for {}", pg_ctl.display(), data_dir.display());
        Self {
            ctx,
            data_dir,
            pg_ctl,
            bin_dir: bin_dir.map(Path::to_path_buf),
            major,
            fs,
        }
    }

    /// Another binary from the same installation as `pg_ctl`
    pub fn locate(&self, name: &str) -> PathBuf {
        locate_pg_bin(name, self.bin_dir.as_deref(), self.major.as_deref())
    }

    fn pg_ctl(&self, command: &str, extra: &[&str]) -> Result<(), CommandError> {
        let bin = self.pg_ctl.to_string_lossy().into_owned();
        let dir = self.data_dir.to_string_lossy().into_owned();
        let mut args: Vec<&str> = vec![bin.as_str(), command, "-D", dir.as_str()];
        args.extend_from_slice(extra);
        self.ctx.run_as_dbsu(&args).map(|_| ())
    }
}

impl PostgresControl for PgCtl {
    fn check_running(&self) -> ProcessStatus {
        let pid = self
            .fs
            .read(&self.data_dir.join(POSTMASTER_PID))
            .as_deref()
            .and_then(parse_postmaster_pid);
        match pid {
            Some(pid) if pid_alive(pid) => ProcessStatus::running(pid),
            _ => ProcessStatus::stopped(),
        }
    }

    fn stop(&self, mode: StopMode, timeout: Duration) -> Result<(), CommandError> {
        let secs = timeout.as_secs().to_string();
        self.pg_ctl("stop", &["-m", mode.as_str(), "-t", secs.as_str()])
    }

    fn start(&self, timeout: Duration) -> Result<(), CommandError> {
        let secs = timeout.as_secs().to_string();
        self.pg_ctl("start", &["-w", "-t", secs.as_str()])
    }

    fn promote(&self) -> Result<(), CommandError> {
        self.pg_ctl("promote", &[])
    }

    fn force_kill(&self, pid: i32) -> Result<(), CommandError> {
        let pid = pid.to_string();
        self.ctx.run_as_dbsu(&["kill", "-9", pid.as_str()]).map(|_| ())
    }
}
