//! pgBackRest invocation.
//!
//! Builds `pgbackrest [--config=..] --stanza=.. [--repo=..] <args> <command>`
//! and runs it as the DBSU. The stanza defaults to the first non-global
//! section of the configuration file.

use crate::codes::{Code, PB_CONFIG_NOT_FOUND, PB_INVALID_BACKUP_TYPE, PITR_NO_BACKUP, PITR_RESTORE_FAILED};
use crate::errors::{PitrError, PitrResult};
use crate::exec::{CommandError, ExecContext};
use crate::pgdata::DataDirInspector;
use crate::target::RecoveryTarget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Default pgBackRest configuration file
pub const DEFAULT_BACKREST_CONFIG: &str = "/etc/pgbackrest/pgbackrest.conf";

/// Resolved repository settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackrestConfig {
    pub config_path: PathBuf,
    pub stanza: String,
    pub repo: Option<String>,
    /// `pg1-path` of the stanza, if configured
    pub pg1_path: Option<PathBuf>,
}

/// First non-global section name and its `pg1-path`
pub fn parse_backrest_config(text: &str) -> (Option<String>, Option<String>) {
    let mut stanza: Option<String> = None;
    let mut pg1_path: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let section = section.trim();
            if stanza.is_some() {
                // only the first stanza is considered
                break;
            }
            if !section.starts_with("global") {
                stanza = Some(section.to_string());
            }
            continue;
        }
        if stanza.is_some() {
            if let Some((key, value)) = line.split_once('=') {
                if key.trim() == "pg1-path" {
                    pg1_path = Some(value.trim().to_string());
                }
            }
        }
    }
    (stanza, pg1_path)
}

impl BackrestConfig {
    /// Resolve the stanza from an explicit name or the configuration file
    pub fn load(
        config_path: &Path,
        stanza: Option<&str>,
        repo: Option<&str>,
        fs: &dyn DataDirInspector,
    ) -> PitrResult<Self> {
        let text = fs.read(config_path);
        let (found_stanza, pg1_path) = text.as_deref().map(parse_backrest_config).unwrap_or((None, None));

        let stanza = match stanza.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_string(),
            None => match found_stanza {
                Some(s) => s,
                None if text.is_none() => {
                    return Err(PitrError::new(PB_CONFIG_NOT_FOUND, "pgBackRest config not found")
                        .with_detail(config_path.display().to_string()))
                }
                None => {
                    return Err(PitrError::new(PB_CONFIG_NOT_FOUND, "no stanza defined in pgBackRest config")
                        .with_detail(config_path.display().to_string()))
                }
            },
        };
        debug!("pgbackrest stanza {} from {}", stanza, config_path.display());

        Ok(Self {
            config_path: config_path.to_path_buf(),
            stanza,
            repo: repo.map(str::to_string).filter(|r| !r.is_empty()),
            pg1_path: pg1_path.map(PathBuf::from),
        })
    }

    /// Leading arguments shared by every pgbackrest command
    pub fn base_args(&self) -> Vec<String> {
        let mut args = vec!["pgbackrest".to_string()];
        if self.config_path != Path::new(DEFAULT_BACKREST_CONFIG) {
            args.push(format!("--config={}", self.config_path.display()));
        }
        args.push(format!("--stanza={}", self.stanza));
        if let Some(repo) = &self.repo {
            args.push(format!("--repo={repo}"));
        }
        args
    }

    /// Full argument vector for `command`
    pub fn command_args(&self, extra: &[String], command: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(extra.iter().cloned());
        args.push(command.to_string());
        args
    }
}

/// What to restore and how recovery should end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub data_dir: PathBuf,
    pub backup_set: Option<String>,
    pub target: RecoveryTarget,
    pub exclusive: bool,
    pub promote: bool,
}

/// Arguments placed between the stanza options and `restore`
pub fn restore_args(req: &RestoreRequest) -> Vec<String> {
    let mut args = vec![format!("--pg1-path={}", req.data_dir.display())];
    if let Some(set) = req.backup_set.as_deref().filter(|s| !s.is_empty()) {
        args.push(format!("--set={set}"));
    }
    args.extend(req.target.backrest_args());
    if req.exclusive {
        args.push("--target-exclusive".to_string());
    }
    if req.promote {
        args.push("--target-action=promote".to_string());
    }
    args
}

/// Map restore failure output to an outcome code. Heuristic: pgBackRest
/// has no stable machine-readable "no backup" signal.
///
/// Only `ERROR:` lines are matched when present; the rest of the output
/// echoes option values such as `--repo1-path=/pg/backup`.
pub fn classify_failure(output: &str) -> Code {
    let text = output.to_lowercase();
    let errors: Vec<&str> = text.lines().filter(|l| l.contains("error:")).collect();
    let candidates = if errors.is_empty() { vec![text.as_str()] } else { errors };
    if candidates.into_iter().any(is_no_backup) {
        PITR_NO_BACKUP
    } else {
        PITR_RESTORE_FAILED
    }
}

fn is_no_backup(text: &str) -> bool {
    let missing = text.contains("not found") || text.contains("does not exist");
    text.contains("no prior backup exists")
        || text.contains("unable to find backup")
        || text.contains("no backup set")
        || (text.contains("backup set") && missing)
        || (text.contains("backup") && missing)
}

/// Backup types accepted by pgBackRest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Full,
    Diff,
    Incr,
}

impl BackupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Diff => "diff",
            BackupKind::Incr => "incr",
        }
    }
}

impl FromStr for BackupKind {
    type Err = PitrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(BackupKind::Full),
            "diff" => Ok(BackupKind::Diff),
            "incr" => Ok(BackupKind::Incr),
            other => Err(PitrError::new(PB_INVALID_BACKUP_TYPE, format!("invalid backup type: {other}"))
                .with_detail("valid types: full, diff, incr")),
        }
    }
}

/// The external backup tool
pub trait BackupTool {
    /// Run `restore` with the given arguments, returning captured output
    fn restore(&self, args: &[String]) -> Result<String, CommandError>;
    fn backup(&self, kind: BackupKind) -> Result<String, CommandError>;
}

#[derive(Debug, Clone)]
pub struct PgBackRest {
    ctx: ExecContext,
    config: BackrestConfig,
}

impl PgBackRest {
    pub fn new(ctx: ExecContext, config: BackrestConfig) -> Self {
        Self { ctx, config }
    }

    pub fn config(&self) -> &BackrestConfig {
        &self.config
    }

    fn run(&self, extra: &[String], command: &str) -> Result<String, CommandError> {
        let args = self.config.command_args(extra, command);
        let inv = self.ctx.as_dbsu(&args)?;
        info!("Running: {}", inv.display());
        inv.run_teed()
    }
}

impl BackupTool for PgBackRest {
    fn restore(&self, args: &[String]) -> Result<String, CommandError> {
        self.run(args, "restore")
    }

    fn backup(&self, kind: BackupKind) -> Result<String, CommandError> {
        self.run(&[format!("--type={}", kind.as_str())], "backup")
    }
}
