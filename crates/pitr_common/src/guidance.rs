//! Post-restore instructions for the operator.

use crate::codes::PITR_POST_FAILED;
use crate::errors::{PitrError, PitrResult};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidanceContext {
    pub data_dir: PathBuf,
    pub no_restart: bool,
    pub promote: bool,
    /// Cluster manager was stopped by this run
    pub cluster_stopped: bool,
    pub cluster_service: String,
    pub stanza: Option<String>,
}

/// A numbered step: title, optional command, optional warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidanceStep {
    pub title: String,
    pub command: Option<String>,
    pub warning: Option<String>,
}

impl GuidanceStep {
    fn new(title: &str, command: Option<String>) -> Self {
        Self {
            title: title.to_string(),
            command,
            warning: None,
        }
    }
}

pub fn guidance_steps(ctx: &GuidanceContext) -> Vec<GuidanceStep> {
    let dir = ctx.data_dir.display();
    let mut steps = Vec::new();

    if ctx.no_restart {
        steps.push(GuidanceStep::new("Start PostgreSQL", Some(format!("pg_ctl start -D {dir}"))));
    }
    steps.push(GuidanceStep::new(
        "Verify recovered data",
        Some("psql -c 'SELECT now(), pg_is_in_recovery()'".to_string()),
    ));
    if !ctx.promote {
        steps.push(GuidanceStep::new(
            "If satisfied, promote to primary",
            Some("pitrctl promote".to_string()),
        ));
    }
    if ctx.cluster_stopped {
        let mut step = GuidanceStep::new(
            &format!("Resume {}", ctx.cluster_service),
            Some(format!("systemctl start {}", ctx.cluster_service)),
        );
        step.warning = Some(format!(
            "{} may re-initialize this node from the current leader; check cluster state first",
            ctx.cluster_service
        ));
        steps.push(step);
    }
    let stanza = ctx.stanza.as_deref().unwrap_or("<stanza>");
    steps.push(GuidanceStep::new(
        "Re-create pgBackRest stanza if needed",
        Some(format!("pgbackrest --stanza={stanza} stanza-create")),
    ));
    steps
}

fn render(out: &mut dyn Write, steps: &[GuidanceStep]) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Post-restore steps:")?;
    for (i, step) in steps.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, step.title)?;
        if let Some(cmd) = &step.command {
            writeln!(out, "     $ {}", cmd)?;
        }
        if let Some(warning) = &step.warning {
            writeln!(out, "     [!] {}", warning)?;
        }
    }
    out.flush()
}

/// Print guidance; any write failure is a post-restore failure
pub fn write_guidance(out: &mut dyn Write, ctx: &GuidanceContext) -> PitrResult<()> {
    render(out, &guidance_steps(ctx)).map_err(|e| {
        PitrError::new(PITR_POST_FAILED, "failed to print post-restore guidance").with_detail(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> GuidanceContext {
        GuidanceContext {
            data_dir: PathBuf::from("/pg/data"),
            no_restart: false,
            promote: false,
            cluster_stopped: true,
            cluster_service: "patroni".to_string(),
            stanza: Some("pg-meta".to_string()),
        }
    }

    #[test]
    fn test_default_steps() {
        let titles: Vec<String> = guidance_steps(&ctx()).into_iter().map(|s| s.title).collect();
        assert_eq!(
            titles,
            vec![
                "Verify recovered data",
                "If satisfied, promote to primary",
                "Resume patroni",
                "Re-create pgBackRest stanza if needed",
            ]
        );
    }

    #[test]
    fn test_no_restart_and_promote() {
        let mut c = ctx();
        c.no_restart = true;
        c.promote = true;
        c.cluster_stopped = false;
        let steps = guidance_steps(&c);
        assert_eq!(steps[0].title, "Start PostgreSQL");
        assert_eq!(steps[0].command.as_deref(), Some("pg_ctl start -D /pg/data"));
        assert!(steps.iter().all(|s| !s.title.contains("promote")));
        assert!(steps.iter().all(|s| !s.title.starts_with("Resume")));
    }

    #[test]
    fn test_written_output() {
        let mut buf: Vec<u8> = Vec::new();
        write_guidance(&mut buf, &ctx()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("  3. Resume patroni"));
        assert!(text.contains("$ pgbackrest --stanza=pg-meta stanza-create"));
        assert!(text.contains("[!] patroni may re-initialize"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_post_failed() {
        let err = write_guidance(&mut BrokenPipe, &ctx()).unwrap_err();
        assert_eq!(err.code, PITR_POST_FAILED);
    }
}
