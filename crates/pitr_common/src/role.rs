//! Server role detection.
//!
//! Three strategies, strongest first once the server is known alive:
//! 1. process listing of the DBSU (`ps`), tells alive and hints the role
//! 2. `SELECT pg_is_in_recovery()`, authoritative when reachable
//! 3. on-disk markers in the data directory, used when nothing else answers
//!
//! Detection never fails; the worst answer is `unknown`.

use crate::exec::ExecContext;
use crate::pgdata::DataDirInspector;
use crate::postgres::POSTMASTER_PID;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A data directory with fewer entries is treated as not a real cluster
pub const MIN_DATA_DIR_ENTRIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Replica,
    Unknown,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Replica => "replica",
            Role::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy produced the role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleSource {
    Psql,
    Ps,
    Pgdata,
    None,
}

impl RoleSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleSource::Psql => "psql",
            RoleSource::Ps => "ps",
            RoleSource::Pgdata => "pgdata",
            RoleSource::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleResult {
    pub role: Role,
    pub alive: bool,
    pub source: RoleSource,
}

impl RoleResult {
    pub fn unknown() -> Self {
        Self {
            role: Role::Unknown,
            alive: false,
            source: RoleSource::None,
        }
    }
}

/// Lists command lines of processes owned by a user
pub trait ProcessLister {
    fn commands_of(&self, user: &str) -> Option<Vec<String>>;
}

/// Asks the live server whether it is in recovery
pub trait RecoveryQuery {
    /// `Some(true)` for a standby, `None` when the server cannot be queried
    fn in_recovery(&self) -> Option<bool>;
}

/// Outcome of scanning process command lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessScan {
    pub alive: bool,
    pub role: Role,
}

const BACKGROUND_MARKERS: &[&str] = &[
    "logger",
    "checkpointer",
    "background writer",
    "stats collector",
    "walwriter",
    "walsender",
];

/// Classify `ps` output lines
pub fn scan_process_lines<S: AsRef<str>>(lines: &[S]) -> ProcessScan {
    let mut alive = false;
    let mut replica = false;

    for line in lines {
        let line = line.as_ref();
        let main = line.contains("post") && line.contains("-D");
        let background =
            line.contains("postgres:") && BACKGROUND_MARKERS.iter().any(|m| line.contains(m));
        if main || background {
            alive = true;
        }
        if line.contains("walreceiver") || line.contains("recovering") {
            replica = true;
        }
    }

    let role = match (alive, replica) {
        (false, _) => Role::Unknown,
        (true, true) => Role::Replica,
        (true, false) => Role::Primary,
    };
    ProcessScan { alive, role }
}

/// Legacy standby configuration lines in `recovery.conf`
fn recovery_conf_is_standby(text: &str) -> bool {
    text.lines().map(str::trim).any(|line| {
        !line.starts_with('#')
            && (line.starts_with("primary_conninfo")
                || line.starts_with("restore_command")
                || line.starts_with("standby_mode"))
    })
}

/// Role from on-disk markers, if the directory looks like a real cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskScan {
    pub role: Role,
    /// `postmaster.pid` present (may be stale)
    pub pid_file: bool,
}

pub fn scan_data_dir(inspector: &dyn DataDirInspector, dir: &std::path::Path) -> Option<DiskScan> {
    if !inspector.exists(dir) || !inspector.is_initialized(dir) {
        debug!("pgdata: {} missing or not initialized", dir.display());
        return None;
    }
    let entries = inspector.list(dir)?;
    if entries.len() < MIN_DATA_DIR_ENTRIES {
        debug!("pgdata: {} has only {} entries", dir.display(), entries.len());
        return None;
    }
    let has = |name: &str| entries.iter().any(|e| e == name);

    let mut role = Role::Primary;
    if has("standby.signal") || has("recovery.signal") {
        role = Role::Replica;
    } else if has("recovery.conf") {
        if let Some(text) = inspector.read(&dir.join("recovery.conf")) {
            if recovery_conf_is_standby(&text) {
                role = Role::Replica;
            }
        }
    } else if has("postgresql.auto.conf") {
        if let Some(text) = inspector.read(&dir.join("postgresql.auto.conf")) {
            let conninfo = text
                .lines()
                .map(str::trim)
                .any(|l| !l.starts_with('#') && l.starts_with("primary_conninfo"));
            if conninfo {
                debug!("pgdata: primary_conninfo set without a signal file, still primary");
            }
        }
    }

    Some(DiskScan {
        role,
        pid_file: has(POSTMASTER_PID),
    })
}

/// Runs the detection strategies in order
pub struct RoleDetector<'a> {
    processes: &'a dyn ProcessLister,
    query: &'a dyn RecoveryQuery,
    inspector: &'a dyn DataDirInspector,
    dbsu: String,
    data_dir: PathBuf,
    verbose: bool,
}

impl<'a> RoleDetector<'a> {
    pub fn new(
        processes: &'a dyn ProcessLister,
        query: &'a dyn RecoveryQuery,
        inspector: &'a dyn DataDirInspector,
        dbsu: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            processes,
            query,
            inspector,
            dbsu: dbsu.into(),
            data_dir: data_dir.into(),
            verbose: false,
        }
    }

    /// Log every stage at info level instead of debug
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn trace(&self, msg: &str) {
        if self.verbose {
            info!("{}", msg);
        } else {
            debug!("{}", msg);
        }
    }

    pub fn detect(&self) -> RoleResult {
        let mut result = RoleResult::unknown();

        // Stage 1: processes
        match self.processes.commands_of(&self.dbsu) {
            Some(lines) => {
                let scan = scan_process_lines(&lines);
                self.trace(&format!("ps: alive={} role={}", scan.alive, scan.role));
                if scan.alive {
                    result = RoleResult {
                        role: scan.role,
                        alive: true,
                        source: RoleSource::Ps,
                    };
                }
            }
            None => self.trace("ps: no process listing available"),
        }

        // Stage 2: live query, authoritative
        if result.alive {
            match self.query.in_recovery() {
                Some(recovering) => {
                    let role = if recovering { Role::Replica } else { Role::Primary };
                    self.trace(&format!("psql: pg_is_in_recovery={recovering}"));
                    if result.role != Role::Unknown && result.role != role {
                        warn!(
                            "Role mismatch: processes suggest {}, server reports {}; trusting the server",
                            result.role, role
                        );
                    }
                    return RoleResult {
                        role,
                        alive: true,
                        source: RoleSource::Psql,
                    };
                }
                None => self.trace("psql: query failed, keeping process hint"),
            }
        }

        if result.role != Role::Unknown {
            return result;
        }

        // Stage 3: data directory markers
        match scan_data_dir(self.inspector, &self.data_dir) {
            Some(disk) => {
                self.trace(&format!("pgdata: role={} pid_file={}", disk.role, disk.pid_file));
                RoleResult {
                    role: disk.role,
                    alive: result.alive || disk.pid_file,
                    source: RoleSource::Pgdata,
                }
            }
            None => {
                self.trace("pgdata: no usable data directory");
                result
            }
        }
    }
}

/// `ps h -u <user> -o command`
#[derive(Debug, Clone, Default)]
pub struct PsLister;

impl ProcessLister for PsLister {
    fn commands_of(&self, user: &str) -> Option<Vec<String>> {
        crate::exec::Invocation::new("ps", &["h", "-u", user, "-o", "command"])
            .run()
            .ok()
            .map(|out| out.lines().map(str::to_string).collect())
    }
}

/// `psql -AXtqw -d postgres -c "SELECT pg_is_in_recovery()"` as the DBSU
#[derive(Debug, Clone)]
pub struct PsqlRecovery {
    ctx: ExecContext,
    psql: PathBuf,
}

impl PsqlRecovery {
    pub fn new(ctx: ExecContext, psql: PathBuf) -> Self {
        Self { ctx, psql }
    }
}

/// Parse a psql boolean scalar
pub fn parse_recovery_flag(output: &str) -> Option<bool> {
    match output.trim() {
        "t" => Some(true),
        "f" => Some(false),
        _ => None,
    }
}

impl RecoveryQuery for PsqlRecovery {
    fn in_recovery(&self) -> Option<bool> {
        let psql = self.psql.to_string_lossy().into_owned();
        self.ctx
            .run_as_dbsu(&[psql.as_str(), "-AXtqw", "-d", "postgres", "-c", "SELECT pg_is_in_recovery()"])
            .ok()
            .as_deref()
            .and_then(parse_recovery_flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_primary_processes() {
        let lines = [
            "/usr/pgsql-16/bin/postgres -D /pg/data",
            "postgres: pg-meta: checkpointer",
            "postgres: pg-meta: walwriter",
        ];
        assert_eq!(
            scan_process_lines(&lines),
            ProcessScan { alive: true, role: Role::Primary }
        );
    }

    #[test]
    fn test_scan_replica_processes() {
        let lines = [
            "postgres: pg-meta: startup recovering 000000010000000000000005",
            "postgres: pg-meta: walreceiver streaming 0/5000148",
            "postgres: pg-meta: checkpointer",
        ];
        assert_eq!(
            scan_process_lines(&lines),
            ProcessScan { alive: true, role: Role::Replica }
        );
    }

    #[test]
    fn test_scan_no_server() {
        let lines = ["-bash", "tmux"];
        assert_eq!(
            scan_process_lines(&lines),
            ProcessScan { alive: false, role: Role::Unknown }
        );
        let empty: [&str; 0] = [];
        assert!(!scan_process_lines(&empty).alive);
    }

    #[test]
    fn test_recovery_conf() {
        assert!(recovery_conf_is_standby("standby_mode = 'on'\n"));
        assert!(recovery_conf_is_standby("# comment\n  primary_conninfo = 'host=x'\n"));
        assert!(!recovery_conf_is_standby("# primary_conninfo = 'host=x'\n"));
        assert!(!recovery_conf_is_standby("recovery_target_timeline = 'latest'\n"));
    }

    #[test]
    fn test_parse_recovery_flag() {
        assert_eq!(parse_recovery_flag("t\n"), Some(true));
        assert_eq!(parse_recovery_flag(" f "), Some(false));
        assert_eq!(parse_recovery_flag("psql: error"), None);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let r = RoleResult { role: Role::Replica, alive: true, source: RoleSource::Psql };
        assert_eq!(
            serde_json::to_string(&r).unwrap(),
            r#"{"role":"replica","alive":true,"source":"psql"}"#
        );
    }
}
