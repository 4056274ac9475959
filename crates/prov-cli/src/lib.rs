//! Línea de comandos `prov` sobre un directorio de experimento versionado con
//! git y un store JSON local o Postgres.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prov_core::{ExecutionPhase, ExperimentConfig, ExperimentGraph, GitBackend, InMemoryGraphStore, ProvenanceRecorder,
                VersionControl, VersionedGraphStore};
use prov_persistence::PgGraphStore;
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "prov", version, about = "Experiment provenance recorder (commit / peek / fork)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Experiment name (defaults to PROV_EXPERIMENT)
    #[arg(short, long, global = true)]
    pub experiment: Option<String>,

    /// Versioning root; the experiment lives in <dir>/<experiment> (defaults to PROV_VERSIONING_DIR)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Directory holding run outputs and ghost captures (defaults to the experiment directory)
    #[arg(long, global = true)]
    pub run_dir: Option<PathBuf>,

    /// Graph store backend
    #[arg(long, value_enum, default_value_t = StoreKind::Json, global = true)]
    pub store: StoreKind,

    /// JSON store file (defaults to <dir>/.provflow/<experiment>.store.json)
    #[arg(long, global = true)]
    pub store_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the experiment repository with an empty graph snapshot
    Init,
    /// Commit the graph snapshot currently in the working tree
    Checkpoint {
        #[arg(short, long, default_value = "checkpoint")]
        message: String,
    },
    /// Record a spec version for the current commit
    Commit {
        #[arg(long, value_enum, default_value_t = Phase::Pre)]
        phase: Phase,
    },
    /// Record a diagnostic snapshot of the run that produced <location>
    Peek {
        #[arg(long)]
        location: String,
    },
    /// Start a new Pre line from a historical commit
    Fork {
        #[arg(long)]
        commit: String,
    },
    /// List spec versions
    History,
    /// List every value ever bound to a literal
    Show {
        #[arg(long)]
        literal: String,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Json,
    Postgres,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Phase {
    Pre,
    Post,
}

impl From<Phase> for ExecutionPhase {
    fn from(p: Phase) -> Self {
        match p {
            Phase::Pre => ExecutionPhase::Pre,
            Phase::Post => ExecutionPhase::Post,
        }
    }
}

impl Cli {
    /// Flags explícitos primero; lo que falte sale de `PROV_*` / `.env`.
    pub fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut cfg = match (&self.experiment, &self.dir) {
            (Some(name), Some(dir)) => ExperimentConfig::new(name.clone(), dir.clone()),
            _ => {
                let mut from_env = ExperimentConfig::from_env().context("experiment configuration")?;
                if let Some(name) = &self.experiment {
                    from_env.experiment_name = name.clone();
                }
                if let Some(dir) = &self.dir {
                    from_env.versioning_dir = dir.clone();
                }
                from_env
            }
        };
        if let Some(run_dir) = &self.run_dir {
            cfg = cfg.with_run_dir(run_dir.clone());
        }
        Ok(cfg)
    }

    fn store_file(&self, cfg: &ExperimentConfig) -> PathBuf {
        self.store_file.clone().unwrap_or_else(|| {
                                   cfg.versioning_dir
                                      .join(".provflow")
                                      .join(format!("{}.store.json", cfg.experiment_name))
                               })
    }
}

/// Ejecuta un comando y devuelve su informe en JSON.
pub fn run(cli: &Cli) -> Result<Value> {
    let cfg = cli.experiment_config()?;
    let git = GitBackend::new();
    if let Command::Init = cli.command {
        return init(&cfg, git);
    }
    let graph = load_working_graph(&cfg)?;
    match cli.store {
        StoreKind::Json => {
            let path = cli.store_file(&cfg);
            let store = InMemoryGraphStore::load_from(&path)?;
            let mut rec = ProvenanceRecorder::new(cfg, store, git, graph);
            let out = dispatch(&cli.command, &mut rec)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
            }
            rec.store().save_to(&path)?;
            debug!("store saved to {}", path.display());
            Ok(out)
        }
        StoreKind::Postgres => {
            let store = PgGraphStore::from_env().context("postgres store")?;
            let mut rec = ProvenanceRecorder::new(cfg, store, git, graph);
            dispatch(&cli.command, &mut rec)
        }
    }
}

fn init(cfg: &ExperimentConfig, mut git: GitBackend) -> Result<Value> {
    let dir = cfg.experiment_dir();
    git.init_repository(&dir)?;
    let snapshot = cfg.snapshot_path();
    if !snapshot.exists() {
        ExperimentGraph::new().write_snapshot(&dir)?;
    }
    let hash = git.commit_all(&dir, "init experiment")?;
    info!("initialised {} at {hash}", dir.display());
    Ok(json!({ "experiment_dir": dir, "commit": hash }))
}

/// Grafo del árbol de trabajo; vacío si todavía no hay snapshot.
fn load_working_graph(cfg: &ExperimentConfig) -> Result<ExperimentGraph> {
    if !cfg.snapshot_path().exists() {
        return Ok(ExperimentGraph::new());
    }
    ExperimentGraph::read_snapshot(&cfg.experiment_dir()).with_context(|| {
                                                             format!("reading {}", cfg.snapshot_path().display())
                                                         })
}

fn dispatch<S>(command: &Command, rec: &mut ProvenanceRecorder<S, GitBackend>) -> Result<Value>
    where S: VersionedGraphStore
{
    let out = match command {
        Command::Init => bail!("init is handled before a store is opened"),
        Command::Checkpoint { message } => json!({ "commit": rec.checkpoint(message)? }),
        Command::Commit { phase } => serde_json::to_value(rec.commit((*phase).into())?)?,
        Command::Peek { location } => serde_json::to_value(rec.peek(location)?)?,
        Command::Fork { commit } => {
            let report = rec.fork(commit)?;
            // el árbol de trabajo sigue en la rama; se deja el grafo restaurado en él
            rec.graph().write_snapshot(&rec.config().experiment_dir())?;
            serde_json::to_value(report)?
        }
        Command::History => serde_json::to_value(rec.history()?)?,
        Command::Show { literal } => serde_json::to_value(rec.bindings_for(literal)?)?,
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commit_with_phase() {
        let cli = Cli::try_parse_from(["prov", "-e", "mnist", "-d", "/tmp/v", "commit", "--phase", "post"]).unwrap();
        assert!(matches!(cli.command, Command::Commit { phase: Phase::Post }));
        assert_eq!(cli.store, StoreKind::Json);
        let cfg = cli.experiment_config().unwrap();
        assert_eq!(cfg.experiment_dir(), PathBuf::from("/tmp/v/mnist"));
        assert_eq!(cli.store_file(&cfg), PathBuf::from("/tmp/v/.provflow/mnist.store.json"));
    }

    #[test]
    fn fork_requires_a_commit() {
        assert!(Cli::try_parse_from(["prov", "fork"]).is_err());
        let cli = Cli::try_parse_from(["prov", "--store", "postgres", "fork", "--commit", "abc123"]).unwrap();
        assert_eq!(cli.store, StoreKind::Postgres);
    }
}
