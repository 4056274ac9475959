use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::{VcsError, VersionControl};
use crate::hashing::hash_str;

const MAIN: &str = "main";

type Tree = BTreeMap<PathBuf, Vec<u8>>;

#[derive(Debug, Clone)]
struct Commit {
    hash: String,
    tree: Tree,
}

#[derive(Debug, Clone, PartialEq)]
enum Head {
    Branch,
    Detached(usize),
}

#[derive(Debug, Clone)]
struct Repo {
    commits: Vec<Commit>,
    tip: Option<usize>,
    head: Head,
    worktree: Tree,
}

impl Default for Repo {
    fn default() -> Self {
        Self { commits: Vec::new(),
               tip: None,
               head: Head::Branch,
               worktree: Tree::new() }
    }
}

impl Repo {
    fn head_index(&self) -> Option<usize> {
        match self.head {
            Head::Branch => self.tip,
            Head::Detached(i) => Some(i),
        }
    }
}

/// Control de versiones en memoria: un repositorio por directorio con una
/// única rama `main`. Pensado para tests y demos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVersionControl {
    repos: HashMap<PathBuf, Repo>,
}

impl InMemoryVersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cantidad de commits del repositorio en `dir`.
    pub fn commit_count(&self, dir: &Path) -> usize {
        self.repos.get(dir).map(|r| r.commits.len()).unwrap_or(0)
    }

    fn repo(&self, dir: &Path) -> Result<&Repo, VcsError> {
        self.repos.get(dir).ok_or(VcsError::NoCommits)
    }
}

impl VersionControl for InMemoryVersionControl {
    fn current_commit(&self, dir: &Path) -> Result<String, VcsError> {
        let repo = self.repo(dir)?;
        repo.head_index()
            .map(|i| repo.commits[i].hash.clone())
            .ok_or(VcsError::NoCommits)
    }

    fn current_ref(&self, dir: &Path) -> Result<String, VcsError> {
        let repo = self.repo(dir)?;
        match repo.head {
            Head::Branch => Ok(MAIN.to_string()),
            Head::Detached(i) => Ok(repo.commits[i].hash.clone()),
        }
    }

    fn checkout(&mut self, dir: &Path, reference: &str) -> Result<(), VcsError> {
        let repo = self.repos
                       .get_mut(dir)
                       .ok_or_else(|| VcsError::UnknownRef(reference.to_string()))?;
        let (head, index) = if reference == MAIN {
            (Head::Branch, repo.tip)
        } else {
            let found = repo.commits
                            .iter()
                            .position(|c| !reference.is_empty() && c.hash.starts_with(reference))
                            .ok_or_else(|| VcsError::UnknownRef(reference.to_string()))?;
            (Head::Detached(found), Some(found))
        };
        repo.worktree = index.map(|i| repo.commits[i].tree.clone()).unwrap_or_default();
        repo.head = head;
        Ok(())
    }

    fn read_file(&self, dir: &Path, rel: &Path) -> Result<Vec<u8>, VcsError> {
        self.repos
            .get(dir)
            .and_then(|r| r.worktree.get(rel))
            .cloned()
            .ok_or_else(|| VcsError::MissingFile(rel.display().to_string()))
    }

    fn write_file(&mut self, dir: &Path, rel: &Path, bytes: &[u8]) -> Result<(), VcsError> {
        self.repos
            .entry(dir.to_path_buf())
            .or_default()
            .worktree
            .insert(rel.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn commit_all(&mut self, dir: &Path, message: &str) -> Result<String, VcsError> {
        let repo = self.repos.entry(dir.to_path_buf()).or_default();
        let parent = repo.head_index().map(|i| repo.commits[i].hash.clone()).unwrap_or_default();
        let mut material = format!("{parent}\n{message}\n{}\n", repo.commits.len());
        for (path, bytes) in &repo.worktree {
            material.push_str(&format!("{}:{}\n", path.display(), hash_str(&String::from_utf8_lossy(bytes))));
        }
        let hash: String = hash_str(&material).chars().take(40).collect();
        repo.commits.push(Commit { hash: hash.clone(),
                                   tree: repo.worktree.clone() });
        let index = repo.commits.len() - 1;
        match repo.head {
            Head::Branch => repo.tip = Some(index),
            Head::Detached(_) => repo.head = Head::Detached(index),
        }
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_snapshot_the_worktree() {
        let dir = Path::new("/xp");
        let mut vcs = InMemoryVersionControl::new();
        assert!(matches!(vcs.current_commit(dir), Err(VcsError::NoCommits)));
        vcs.write_file(dir, Path::new("a"), b"1").unwrap();
        let c1 = vcs.commit_all(dir, "first").unwrap();
        vcs.write_file(dir, Path::new("a"), b"2").unwrap();
        let c2 = vcs.commit_all(dir, "second").unwrap();
        assert_ne!(c1, c2);
        assert_eq!(c1.len(), 40);
        assert_eq!(vcs.current_commit(dir).unwrap(), c2);

        vcs.checkout(dir, &c1[..8]).unwrap();
        assert_eq!(vcs.read_file(dir, Path::new("a")).unwrap(), b"1");
        assert_eq!(vcs.current_ref(dir).unwrap(), c1);
        vcs.checkout(dir, "main").unwrap();
        assert_eq!(vcs.current_commit(dir).unwrap(), c2);
        assert_eq!(vcs.commit_count(dir), 2);
    }
}
