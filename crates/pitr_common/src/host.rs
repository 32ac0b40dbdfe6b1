//! Real collaborators for the local host, wired from config and flags.

use crate::backrest::{BackrestConfig, PgBackRest};
use crate::cluster::SystemdService;
use crate::config::{resolve_data_dir, Config, PGDATA_ENV};
use crate::errors::{PitrError, PitrResult};
use crate::exec::ExecContext;
use crate::pgdata::DbsuFs;
use crate::pitr::Collaborators;
use crate::postgres::PgCtl;
use crate::role::{PsLister, PsqlRecovery, RoleDetector};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub dbsu: Option<String>,
    pub data_dir: Option<String>,
    pub backrest_config: Option<String>,
    pub stanza: Option<String>,
    pub repo: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub struct Host {
    pub ctx: ExecContext,
    pub data_dir: PathBuf,
    pub cluster: SystemdService,
    pub pg: PgCtl,
    pub fs: DbsuFs,
    backrest: PitrResult<PgBackRest>,
    processes: PsLister,
    query: PsqlRecovery,
}

impl Host {
    pub fn new(config: &Config, overrides: &Overrides) -> Self {
        let dbsu = non_empty(&overrides.dbsu).unwrap_or(config.dbsu.as_str());
        let ctx = ExecContext::detect(dbsu, config.non_interactive);
        let fs = DbsuFs::new(ctx.clone());

        let backrest_path = non_empty(&overrides.backrest_config).unwrap_or(config.backrest.config_path.as_str());
        let stanza = non_empty(&overrides.stanza).or(non_empty(&config.backrest.stanza));
        let repo = non_empty(&overrides.repo).or(non_empty(&config.backrest.repo));
        let backrest = BackrestConfig::load(Path::new(backrest_path), stanza, repo, &fs);

        let pgdata = std::env::var(PGDATA_ENV).ok();
        let pg1_path = backrest.as_ref().ok().and_then(|b| b.pg1_path.clone());
        let data_dir = resolve_data_dir(
            non_empty(&overrides.data_dir),
            config,
            pg1_path.as_deref(),
            pgdata.as_deref(),
        );
        debug!("data dir {}, dbsu {}", data_dir.display(), ctx.dbsu);

        let pg = PgCtl::new(ctx.clone(), data_dir.clone(), config.pg_bin_dir.as_deref().map(Path::new));
        let query = PsqlRecovery::new(ctx.clone(), pg.locate("psql"));
        Self {
            cluster: SystemdService::new(ctx.clone(), config.cluster_service.clone()),
            pg,
            fs,
            backrest: backrest.map(|b| PgBackRest::new(ctx.clone(), b)),
            processes: PsLister,
            query,
            data_dir,
            ctx,
        }
    }

    pub fn backrest(&self) -> PitrResult<&PgBackRest> {
        self.backrest.as_ref().map_err(PitrError::clone)
    }

    pub fn stanza(&self) -> Option<String> {
        self.backrest.as_ref().ok().map(|b| b.config().stanza.clone())
    }

    pub fn collaborators(&self) -> PitrResult<Collaborators<'_>> {
        Ok(Collaborators {
            cluster: &self.cluster,
            pg: &self.pg,
            tool: self.backrest()?,
            inspector: &self.fs,
        })
    }

    pub fn role_detector(&self) -> RoleDetector<'_> {
        RoleDetector::new(&self.processes, &self.query, &self.fs, self.ctx.dbsu.clone(), self.data_dir.clone())
    }
}
