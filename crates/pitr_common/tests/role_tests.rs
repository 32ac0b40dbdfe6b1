//! Role detection strategy chain.

mod common;

use common::initialized_data_dir;
use pitr_common::exec::ExecContext;
use pitr_common::pgdata::DbsuFs;
use pitr_common::role::{ProcessLister, RecoveryQuery, Role, RoleDetector, RoleResult, RoleSource};
use std::path::Path;

struct Procs(Option<Vec<&'static str>>);

impl ProcessLister for Procs {
    fn commands_of(&self, _user: &str) -> Option<Vec<String>> {
        self.0
            .as_ref()
            .map(|lines| lines.iter().map(|l| l.to_string()).collect())
    }
}

struct Query(Option<bool>);

impl RecoveryQuery for Query {
    fn in_recovery(&self) -> Option<bool> {
        self.0
    }
}

const PRIMARY_PS: &[&str] = &[
    "/usr/pgsql-16/bin/postgres -D /pg/data",
    "postgres: pg-meta: checkpointer",
];

const REPLICA_PS: &[&str] = &[
    "/usr/pgsql-16/bin/postgres -D /pg/data",
    "postgres: pg-meta: walreceiver streaming 0/5000148",
];

fn detect(procs: Procs, query: Query, dir: &Path) -> RoleResult {
    let fs = DbsuFs::new(ExecContext::detect("postgres", true));
    RoleDetector::new(&procs, &query, &fs, "postgres", dir).detect()
}

#[test]
fn test_standby_signal_means_replica() {
    let dir = initialized_data_dir();
    std::fs::write(dir.path().join("standby.signal"), "").unwrap();

    let result = detect(Procs(None), Query(None), dir.path());
    assert_eq!(
        result,
        RoleResult { role: Role::Replica, alive: false, source: RoleSource::Pgdata }
    );

    let result = detect(Procs(Some(vec!["-bash"])), Query(Some(false)), dir.path());
    assert_eq!(result.role, Role::Replica);
    assert_eq!(result.source, RoleSource::Pgdata);
}

#[test]
fn test_stopped_primary_from_disk() {
    let dir = initialized_data_dir();
    let result = detect(Procs(Some(vec![])), Query(None), dir.path());
    assert_eq!(
        result,
        RoleResult { role: Role::Primary, alive: false, source: RoleSource::Pgdata }
    );
}

#[test]
fn test_pid_file_marks_alive() {
    let dir = initialized_data_dir();
    std::fs::write(dir.path().join("postmaster.pid"), "4242\n").unwrap();
    let result = detect(Procs(None), Query(None), dir.path());
    assert!(result.alive);
    assert_eq!(result.role, Role::Primary);
}

#[test]
fn test_legacy_recovery_conf() {
    let dir = initialized_data_dir();
    std::fs::write(
        dir.path().join("recovery.conf"),
        "# generated\nstandby_mode = 'on'\nprimary_conninfo = 'host=10.0.0.1'\n",
    )
    .unwrap();
    assert_eq!(detect(Procs(None), Query(None), dir.path()).role, Role::Replica);
}

#[test]
fn test_sparse_dir_is_unknown() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("PG_VERSION"), "16\n").unwrap();
    std::fs::write(dir.path().join("standby.signal"), "").unwrap();
    assert_eq!(detect(Procs(None), Query(None), dir.path()), RoleResult::unknown());
}

#[test]
fn test_query_wins_over_processes() {
    let dir = tempfile::tempdir().unwrap();
    let result = detect(Procs(Some(REPLICA_PS.to_vec())), Query(Some(false)), dir.path());
    assert_eq!(
        result,
        RoleResult { role: Role::Primary, alive: true, source: RoleSource::Psql }
    );

    let result = detect(Procs(Some(PRIMARY_PS.to_vec())), Query(Some(true)), dir.path());
    assert_eq!(result.role, Role::Replica);
}

#[test]
fn test_process_hint_when_query_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = detect(Procs(Some(REPLICA_PS.to_vec())), Query(None), dir.path());
    assert_eq!(
        result,
        RoleResult { role: Role::Replica, alive: true, source: RoleSource::Ps }
    );
}

#[test]
fn test_nothing_known() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent");
    assert_eq!(detect(Procs(None), Query(Some(true)), &missing), RoleResult::unknown());
}
