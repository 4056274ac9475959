//! Backend de control de versiones del directorio de experimento.
//!
//! Nada aquí cambia el directorio de trabajo del proceso: cada operación
//! recibe el directorio del repositorio explícitamente.
mod git;
mod memory;

use std::path::{Path, PathBuf};

use log::{debug, error};
use thiserror::Error;

pub use git::GitBackend;
pub use memory::InMemoryVersionControl;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("unknown ref {0}")] UnknownRef(String),
    #[error("file {0} not present in checkout")] MissingFile(String),
    #[error("repository has no commits")] NoCommits,
    #[error("could not spawn version control: {0}")] Spawn(String),
    #[error("`{command}` failed: {stderr}")] Command { command: String, stderr: String },
    #[error("io: {0}")] Io(#[from] std::io::Error),
}

pub trait VersionControl {
    /// Hash del commit actualmente extraído en `dir`.
    fn current_commit(&self, dir: &Path) -> Result<String, VcsError>;
    /// Rama actual, o el hash del commit si la cabeza está desacoplada.
    fn current_ref(&self, dir: &Path) -> Result<String, VcsError>;
    fn checkout(&mut self, dir: &Path, reference: &str) -> Result<(), VcsError>;
    /// Lee `rel` tal como está en el checkout actual.
    fn read_file(&self, dir: &Path, rel: &Path) -> Result<Vec<u8>, VcsError>;
    fn write_file(&mut self, dir: &Path, rel: &Path, bytes: &[u8]) -> Result<(), VcsError>;
    /// Registra todo el árbol de trabajo y devuelve el hash del nuevo commit.
    fn commit_all(&mut self, dir: &Path, message: &str) -> Result<String, VcsError>;
}

/// Checkout con alcance: extrae `target` y vuelve a la referencia previa.
///
/// En el camino feliz se llama a `restore`, que propaga el fallo. Si el guard
/// se suelta sin `restore` (error o unwinding), `Drop` lo intenta y sólo
/// puede dejarlo en el log.
pub struct CheckedOutRef<'a, V: VersionControl + ?Sized> {
    vcs: &'a mut V,
    dir: PathBuf,
    previous: String,
    restored: bool,
}

impl<'a, V: VersionControl + ?Sized> CheckedOutRef<'a, V> {
    pub fn new(vcs: &'a mut V, dir: &Path, target: &str) -> Result<Self, VcsError> {
        let previous = vcs.current_ref(dir)?;
        vcs.checkout(dir, target)?;
        debug!("checked out {target} in {} (was {previous})", dir.display());
        Ok(Self { vcs,
                  dir: dir.to_path_buf(),
                  previous,
                  restored: false })
    }

    /// Vuelve a la referencia previa y devuelve el error si no lo consigue.
    pub fn restore(mut self) -> Result<(), VcsError> {
        self.restored = true;
        self.vcs.checkout(&self.dir, &self.previous)?;
        debug!("restored {} in {}", self.previous, self.dir.display());
        Ok(())
    }

    pub fn read_file(&self, rel: &Path) -> Result<Vec<u8>, VcsError> {
        self.vcs.read_file(&self.dir, rel)
    }

    pub fn previous(&self) -> &str {
        &self.previous
    }
}

impl<V: VersionControl + ?Sized> Drop for CheckedOutRef<'_, V> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        match self.vcs.checkout(&self.dir, &self.previous) {
            Ok(()) => debug!("restored {} in {}", self.previous, self.dir.display()),
            Err(e) => error!("could not restore {} in {}: {e}", self.previous, self.dir.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_previous_ref() {
        let dir = Path::new("/xp");
        let mut vcs = InMemoryVersionControl::new();
        vcs.write_file(dir, Path::new("f.txt"), b"one").unwrap();
        let first = vcs.commit_all(dir, "one").unwrap();
        vcs.write_file(dir, Path::new("f.txt"), b"two").unwrap();
        vcs.commit_all(dir, "two").unwrap();
        let branch = vcs.current_ref(dir).unwrap();
        {
            let guard = CheckedOutRef::new(&mut vcs, dir, &first).unwrap();
            assert_eq!(guard.read_file(Path::new("f.txt")).unwrap(), b"one");
        }
        assert_eq!(vcs.current_ref(dir).unwrap(), branch);
        assert_eq!(vcs.read_file(dir, Path::new("f.txt")).unwrap(), b"two");
    }

    /// Acepta el primer checkout y rechaza los siguientes.
    struct OneCheckout {
        inner: InMemoryVersionControl,
        checkouts: usize,
    }

    impl VersionControl for OneCheckout {
        fn current_commit(&self, dir: &Path) -> Result<String, VcsError> {
            self.inner.current_commit(dir)
        }
        fn current_ref(&self, dir: &Path) -> Result<String, VcsError> {
            self.inner.current_ref(dir)
        }
        fn checkout(&mut self, dir: &Path, reference: &str) -> Result<(), VcsError> {
            self.checkouts += 1;
            if self.checkouts > 1 {
                return Err(VcsError::Command { command: format!("git checkout {reference}"),
                                               stderr: "index.lock exists".into() });
            }
            self.inner.checkout(dir, reference)
        }
        fn read_file(&self, dir: &Path, rel: &Path) -> Result<Vec<u8>, VcsError> {
            self.inner.read_file(dir, rel)
        }
        fn write_file(&mut self, dir: &Path, rel: &Path, bytes: &[u8]) -> Result<(), VcsError> {
            self.inner.write_file(dir, rel, bytes)
        }
        fn commit_all(&mut self, dir: &Path, message: &str) -> Result<String, VcsError> {
            self.inner.commit_all(dir, message)
        }
    }

    #[test]
    fn explicit_restore_reports_failure() {
        let dir = Path::new("/xp");
        let mut inner = InMemoryVersionControl::new();
        let first = inner.commit_all(dir, "one").unwrap();
        inner.commit_all(dir, "two").unwrap();
        let mut vcs = OneCheckout { inner, checkouts: 0 };
        let guard = CheckedOutRef::new(&mut vcs, dir, &first).unwrap();
        let err = guard.restore().unwrap_err();
        assert!(matches!(err, VcsError::Command { .. }));
        // sin segundo intento desde Drop
        assert_eq!(vcs.checkouts, 2);
    }

    #[test]
    fn explicit_restore_returns_to_branch() {
        let dir = Path::new("/xp");
        let mut vcs = InMemoryVersionControl::new();
        let first = vcs.commit_all(dir, "one").unwrap();
        let tip = vcs.commit_all(dir, "two").unwrap();
        let branch = vcs.current_ref(dir).unwrap();
        let guard = CheckedOutRef::new(&mut vcs, dir, &first).unwrap();
        assert_eq!(guard.previous(), branch);
        guard.restore().unwrap();
        assert_eq!(vcs.current_commit(dir).unwrap(), tip);
    }

    #[test]
    fn unknown_target_leaves_ref_alone() {
        let dir = Path::new("/xp");
        let mut vcs = InMemoryVersionControl::new();
        vcs.commit_all(dir, "init").unwrap();
        let before = vcs.current_ref(dir).unwrap();
        assert!(matches!(CheckedOutRef::new(&mut vcs, dir, "deadbeef"), Err(VcsError::UnknownRef(_))));
        assert_eq!(vcs.current_ref(dir).unwrap(), before);
    }
}
