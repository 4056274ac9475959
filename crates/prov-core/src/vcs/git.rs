use std::fs;
use std::path::Path;
use std::process::Command;

use log::debug;

use super::{VcsError, VersionControl};

/// Backend sobre el binario `git`; cada llamada usa `git -C <dir>`.
#[derive(Debug, Clone)]
pub struct GitBackend {
    program: String,
    author_name: String,
    author_email: String,
}

impl Default for GitBackend {
    fn default() -> Self {
        Self { program: "git".into(),
               author_name: "provflow".into(),
               author_email: "provflow@localhost".into() }
    }
}

impl GitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    /// `true` si el binario responde a `git --version`.
    pub fn available(&self) -> bool {
        Command::new(&self.program).arg("--version")
                                   .output()
                                   .map(|o| o.status.success())
                                   .unwrap_or(false)
    }

    /// `git init` sobre `dir` (creándolo si hace falta).
    pub fn init_repository(&self, dir: &Path) -> Result<(), VcsError> {
        fs::create_dir_all(dir)?;
        self.run(dir, &["init", "--quiet"])?;
        Ok(())
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String, VcsError> {
        let output = Command::new(&self.program).arg("-C")
                                                .arg(dir)
                                                .args(args)
                                                .output()
                                                .map_err(|e| VcsError::Spawn(e.to_string()))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(VcsError::Command { command: format!("git {}", args.join(" ")),
                                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string() })
        }
    }
}

impl VersionControl for GitBackend {
    fn current_commit(&self, dir: &Path) -> Result<String, VcsError> {
        self.run(dir, &["rev-parse", "--verify", "-q", "HEAD"])
            .map_err(|_| VcsError::NoCommits)
    }

    fn current_ref(&self, dir: &Path) -> Result<String, VcsError> {
        match self.run(dir, &["symbolic-ref", "--short", "-q", "HEAD"]) {
            Ok(branch) if !branch.is_empty() => Ok(branch),
            _ => self.current_commit(dir),
        }
    }

    fn checkout(&mut self, dir: &Path, reference: &str) -> Result<(), VcsError> {
        if self.run(dir, &["rev-parse", "--verify", "-q", &format!("{reference}^{{commit}}")])
               .is_err()
        {
            return Err(VcsError::UnknownRef(reference.to_string()));
        }
        self.run(dir, &["checkout", "--quiet", reference])?;
        debug!("git checkout {reference} in {}", dir.display());
        Ok(())
    }

    fn read_file(&self, dir: &Path, rel: &Path) -> Result<Vec<u8>, VcsError> {
        let path = dir.join(rel);
        if !path.is_file() {
            return Err(VcsError::MissingFile(rel.display().to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn write_file(&mut self, dir: &Path, rel: &Path, bytes: &[u8]) -> Result<(), VcsError> {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    fn commit_all(&mut self, dir: &Path, message: &str) -> Result<String, VcsError> {
        self.run(dir, &["add", "-A"])?;
        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        self.run(dir,
                 &["-c", &name, "-c", &email, "commit", "--quiet", "--allow-empty", "-m", message])?;
        self.current_commit(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::CheckedOutRef;

    #[test]
    fn git_round_trip_through_checkout() {
        let git = GitBackend::new();
        if !git.available() {
            eprintln!("git not on PATH; skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut git = git;
        git.init_repository(dir.path()).unwrap();
        git.write_file(dir.path(), Path::new("0/graph.json"), b"{\"v\":1}").unwrap();
        let first = git.commit_all(dir.path(), "first").unwrap();
        git.write_file(dir.path(), Path::new("0/graph.json"), b"{\"v\":2}").unwrap();
        let second = git.commit_all(dir.path(), "second").unwrap();
        assert_ne!(first, second);
        let branch = git.current_ref(dir.path()).unwrap();
        {
            let guard = CheckedOutRef::new(&mut git, dir.path(), &first).unwrap();
            assert_eq!(guard.read_file(Path::new("0/graph.json")).unwrap(), b"{\"v\":1}");
        }
        assert_eq!(git.current_ref(dir.path()).unwrap(), branch);
        assert_eq!(git.current_commit(dir.path()).unwrap(), second);
        assert!(matches!(git.checkout(dir.path(), "0000000"), Err(VcsError::UnknownRef(_))));
    }
}
