//! Privileged command execution.
//!
//! Commands touching the data directory or the server process must run as
//! the database superuser (DBSU). `ExecContext` decides how to get there from
//! the current identity and is passed explicitly to every component that
//! spawns processes:
//! - already the DBSU: run directly
//! - root: `su - <dbsu> -c '<quoted command>'`
//! - anyone else: `sudo -inu <dbsu> -- <command>`

use nix::unistd::{Uid, User};
use serde::Serialize;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Default database superuser
pub const DEFAULT_DBSU: &str = "postgres";

/// Failure to run an external command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("failed to run {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with code {code}: {output}")]
    Exit {
        program: String,
        code: i32,
        output: String,
    },

    #[error("{program} terminated by signal")]
    Signaled { program: String, output: String },
}

impl CommandError {
    /// Combined output captured before the failure, if any
    pub fn output(&self) -> &str {
        match self {
            CommandError::Exit { output, .. } | CommandError::Signaled { output, .. } => output,
            _ => "",
        }
    }
}

/// A fully resolved program plus argument vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<S: AsRef<str>>(program: &str, args: &[S]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    /// Shell-like rendering for logs and plans
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run and capture stdout followed by stderr
    pub fn run(&self) -> Result<String, CommandError> {
        debug!("exec: {}", self.display());
        let out = self
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        self.finish(out.status, text)
    }

    /// Run while echoing output to our stderr, and capture it as well.
    /// Used for long operations the operator should watch.
    pub fn run_teed(&self) -> Result<String, CommandError> {
        debug!("exec (teed): {}", self.display());
        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let captured = Arc::new(Mutex::new(Vec::<u8>::new()));
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        std::thread::scope(|s| {
            if let Some(out) = stdout {
                let buf = Arc::clone(&captured);
                s.spawn(move || tee(out, buf));
            }
            if let Some(err) = stderr {
                let buf = Arc::clone(&captured);
                s.spawn(move || tee(err, buf));
            }
        });

        let status = child.wait().map_err(|e| self.spawn_error(e))?;
        let text = match captured.lock() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        };
        self.finish(status, text)
    }

    fn spawn_error(&self, err: std::io::Error) -> CommandError {
        CommandError::Spawn {
            program: self.program.clone(),
            reason: err.to_string(),
        }
    }

    fn finish(&self, status: std::process::ExitStatus, output: String) -> Result<String, CommandError> {
        if status.success() {
            return Ok(output);
        }
        match status.code() {
            Some(code) => Err(CommandError::Exit {
                program: self.program.clone(),
                code,
                output: output.trim().to_string(),
            }),
            None => Err(CommandError::Signaled {
                program: self.program.clone(),
                output: output.trim().to_string(),
            }),
        }
    }
}

fn tee<R: Read>(mut source: R, sink: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    let mut stderr = std::io::stderr();
    loop {
        match source.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let _ = stderr.write_all(&chunk[..n]);
                if let Ok(mut buf) = sink.lock() {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}

/// Quote an argument for a POSIX shell. Plain words pass through.
pub fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let plain = arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\"'\"'"))
}

/// Who we are and who we need to become
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecContext {
    /// Name of the invoking user
    pub current_user: String,
    /// Effective uid is 0
    pub is_root: bool,
    /// Database superuser
    pub dbsu: String,
    /// Never prompt for a password (adds `-n` to sudo)
    pub non_interactive: bool,
}

impl ExecContext {
    /// Build a context from the running process identity
    pub fn detect(dbsu: &str, non_interactive: bool) -> Self {
        let current_user = User::from_uid(Uid::current())
            .ok()
            .flatten()
            .map(|u| u.name)
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_default();

        Self {
            current_user,
            is_root: Uid::effective().is_root(),
            dbsu: if dbsu.is_empty() { DEFAULT_DBSU.to_string() } else { dbsu.to_string() },
            non_interactive,
        }
    }

    pub fn is_dbsu(&self) -> bool {
        self.current_user == self.dbsu
    }

    /// Invocation running `args` as the DBSU
    pub fn as_dbsu<S: AsRef<str>>(&self, args: &[S]) -> Result<Invocation, CommandError> {
        let (program, rest) = args.split_first().ok_or(CommandError::Empty)?;
        let program = program.as_ref();

        if self.is_dbsu() {
            return Ok(Invocation::new(program, rest));
        }

        if self.is_root {
            let line = args
                .iter()
                .map(|a| shell_quote(a.as_ref()))
                .collect::<Vec<_>>()
                .join(" ");
            return Ok(Invocation::new("su", &["-", self.dbsu.as_str(), "-c", line.as_str()]));
        }

        let mut sudo: Vec<String> = Vec::with_capacity(args.len() + 4);
        if self.non_interactive {
            sudo.push("-n".to_string());
        }
        sudo.push("-inu".to_string());
        sudo.push(self.dbsu.clone());
        sudo.push("--".to_string());
        sudo.extend(args.iter().map(|a| a.as_ref().to_string()));
        Ok(Invocation::new("sudo", &sudo))
    }

    /// Invocation running `args` with root privileges
    pub fn as_root<S: AsRef<str>>(&self, args: &[S]) -> Result<Invocation, CommandError> {
        let (program, rest) = args.split_first().ok_or(CommandError::Empty)?;
        if self.is_root {
            return Ok(Invocation::new(program.as_ref(), rest));
        }
        let mut sudo: Vec<String> = Vec::with_capacity(args.len() + 1);
        if self.non_interactive {
            sudo.push("-n".to_string());
        }
        sudo.extend(args.iter().map(|a| a.as_ref().to_string()));
        Ok(Invocation::new("sudo", &sudo))
    }

    pub fn run_as_dbsu<S: AsRef<str>>(&self, args: &[S]) -> Result<String, CommandError> {
        self.as_dbsu(args)?.run()
    }

    pub fn run_as_root<S: AsRef<str>>(&self, args: &[S]) -> Result<String, CommandError> {
        self.as_root(args)?.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(user: &str, root: bool) -> ExecContext {
        ExecContext {
            current_user: user.to_string(),
            is_root: root,
            dbsu: "postgres".to_string(),
            non_interactive: false,
        }
    }

    #[test]
    fn test_dbsu_runs_directly() {
        let inv = ctx("postgres", false).as_dbsu(&["pg_ctl", "status", "-D", "/pg/data"]).unwrap();
        assert_eq!(inv.program, "pg_ctl");
        assert_eq!(inv.args, vec!["status", "-D", "/pg/data"]);
    }

    #[test]
    fn test_root_uses_su_with_quoted_line() {
        let inv = ctx("root", true)
            .as_dbsu(&["psql", "-c", "SELECT pg_is_in_recovery()"])
            .unwrap();
        assert_eq!(inv.program, "su");
        assert_eq!(
            inv.args,
            vec!["-", "postgres", "-c", "psql -c 'SELECT pg_is_in_recovery()'"]
        );
    }

    #[test]
    fn test_other_user_uses_sudo() {
        let inv = ctx("alice", false).as_dbsu(&["kill", "-9", "42"]).unwrap();
        assert_eq!(inv.program, "sudo");
        assert_eq!(inv.args, vec!["-inu", "postgres", "--", "kill", "-9", "42"]);

        let mut quiet = ctx("alice", false);
        quiet.non_interactive = true;
        let inv = quiet.as_dbsu(&["kill", "-9", "42"]).unwrap();
        assert_eq!(inv.args[0], "-n");
        assert_eq!(inv.args[1], "-inu");
    }

    #[test]
    fn test_root_commands() {
        let inv = ctx("root", true).as_root(&["systemctl", "stop", "patroni"]).unwrap();
        assert_eq!(inv.display(), "systemctl stop patroni");
        let inv = ctx("alice", false).as_root(&["systemctl", "stop", "patroni"]).unwrap();
        assert_eq!(inv.display(), "sudo systemctl stop patroni");
    }

    #[test]
    fn test_empty_command_rejected() {
        let empty: [&str; 0] = [];
        assert_eq!(ctx("root", true).as_dbsu(&empty), Err(CommandError::Empty));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-word_1.2"), "plain-word_1.2");
        assert_eq!(shell_quote("--target=2025-01-01"), "--target=2025-01-01");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn test_run_captures_exit_code() {
        let ok = Invocation::new("sh", &["-c", "echo out; echo err >&2"]).run().unwrap();
        assert!(ok.contains("out"));
        assert!(ok.contains("err"));

        let err = Invocation::new("sh", &["-c", "echo boom; exit 3"]).run().unwrap_err();
        match err {
            CommandError::Exit { code, output, .. } => {
                assert_eq!(code, 3);
                assert_eq!(output, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_run_teed_captures_both_streams() {
        let out = Invocation::new("sh", &["-c", "echo one; echo two >&2"])
            .run_teed()
            .unwrap();
        assert!(out.contains("one"));
        assert!(out.contains("two"));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = Invocation::new("/nonexistent/pitrctl-binary", &["x"]).run().unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
