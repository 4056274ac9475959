//! Configuración de un experimento: nombre, directorio versionado y
//! directorio de ejecución (donde aparecen las capturas `ghost_literal_*`).
//!
//! Variables de entorno: `PROV_EXPERIMENT`, `PROV_VERSIONING_DIR` y
//! opcionalmente `PROV_RUN_DIR`. El archivo `.env` se carga una sola vez.

use std::env;
use std::path::{Path, PathBuf};

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::constants::SNAPSHOT_FILE;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} no definido")] Missing(&'static str),
    #[error("{var} inválido: {reason}")] Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentConfig {
    pub experiment_name: String,
    pub versioning_dir: PathBuf,
    run_dir: Option<PathBuf>,
}

impl ExperimentConfig {
    pub fn new(experiment_name: impl Into<String>, versioning_dir: impl Into<PathBuf>) -> Self {
        Self { experiment_name: experiment_name.into(),
               versioning_dir: versioning_dir.into(),
               run_dir: None }
    }

    pub fn with_run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.run_dir = Some(run_dir.into());
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV_LOADED);
        let name = env::var("PROV_EXPERIMENT").map_err(|_| ConfigError::Missing("PROV_EXPERIMENT"))?;
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid { var: "PROV_EXPERIMENT",
                                              reason: "empty".into() });
        }
        let dir = env::var("PROV_VERSIONING_DIR").map_err(|_| ConfigError::Missing("PROV_VERSIONING_DIR"))?;
        let mut cfg = Self::new(name, dir);
        if let Ok(run) = env::var("PROV_RUN_DIR") {
            cfg = cfg.with_run_dir(run);
        }
        Ok(cfg)
    }

    /// `versioning_dir/experiment_name`: raíz del repositorio versionado.
    pub fn experiment_dir(&self) -> PathBuf {
        self.versioning_dir.join(&self.experiment_name)
    }

    /// Directorio de ejecución; por defecto el del experimento.
    pub fn run_dir(&self) -> PathBuf {
        self.run_dir.clone().unwrap_or_else(|| self.experiment_dir())
    }

    /// Ruta del snapshot relativa al directorio del experimento.
    pub fn snapshot_rel(&self) -> &'static Path {
        Path::new(SNAPSHOT_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.experiment_dir().join(SNAPSHOT_FILE)
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_experiment_dir() {
        let cfg = ExperimentConfig::new("mnist", "/tmp/xp");
        assert_eq!(cfg.experiment_dir(), PathBuf::from("/tmp/xp/mnist"));
        assert_eq!(cfg.run_dir(), PathBuf::from("/tmp/xp/mnist"));
        assert_eq!(cfg.snapshot_path(), PathBuf::from("/tmp/xp/mnist/0/experiment_graph.json"));
        let cfg = cfg.with_run_dir("/tmp/run");
        assert_eq!(cfg.run_dir(), PathBuf::from("/tmp/run"));
    }
}
