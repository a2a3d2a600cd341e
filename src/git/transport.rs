//! Thin wrapper over git2 for the sync pipeline.
//!
//! One working directory per process instance; the remote branch is shared
//! and always force-pushed. The wrapper owns repository bootstrap, branch
//! management, fetch/push with credential callbacks, remote tree reads, and
//! index staging. Everything merge-related lives above this layer.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use git2::{
    BranchType, Commit, Cred, FetchOptions, IndexAddOption, PushOptions, RemoteCallbacks,
    Repository, RepositoryInitOptions, Signature, StatusOptions,
};

use super::error::SyncError;

/// Fixed commit identity; every writer signs the same way so merged
/// snapshots are byte-identical across replicas.
const COMMIT_NAME: &str = "git-storage";
const COMMIT_EMAIL: &str = "sync@git-storage.local";

fn read_tree_file(repo: &Repository, tree: &git2::Tree<'_>, path: &Path) -> Option<Vec<u8>> {
    let entry = tree.get_path(path).ok()?;
    let object = entry.to_object(repo).ok()?;
    let blob = object.peel_to_blob().ok()?;
    Some(blob.content().to_vec())
}

/// Everything the transport needs to know about one repository.
#[derive(Clone, Debug)]
pub struct RepoSpec {
    pub workdir: PathBuf,
    pub branch: String,
    pub remote_url: Option<String>,
    pub username: String,
    pub token: Option<String>,
}

impl RepoSpec {
    fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    fn remote_ref(&self) -> String {
        format!("refs/remotes/origin/{}", self.branch)
    }

    /// Open the repository, initializing it (with the configured branch as
    /// default) and attaching `origin` on first use.
    pub fn ensure_open(&self) -> Result<Repository, SyncError> {
        fs::create_dir_all(&self.workdir)?;
        let repo = if self.workdir.join(".git").exists() {
            Repository::open(&self.workdir)
                .map_err(|err| SyncError::OpenRepo(self.workdir.clone(), err))?
        } else {
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head(&self.branch);
            Repository::init_opts(&self.workdir, &opts)
                .map_err(|err| SyncError::InitRepo(self.workdir.clone(), err))?
        };
        self.ensure_origin(&repo)?;
        Ok(repo)
    }

    fn ensure_origin(&self, repo: &Repository) -> Result<(), SyncError> {
        if let Some(url) = self.remote_url.as_deref() {
            if repo.find_remote("origin").is_err() {
                repo.remote("origin", url)?;
            }
        }
        Ok(())
    }

    /// Point HEAD at the configured branch: the local branch if it exists,
    /// a branch created from `origin/<branch>` if one was fetched before,
    /// or the unborn branch otherwise.
    pub fn ensure_branch(&self, repo: &Repository) -> Result<(), SyncError> {
        if repo.find_branch(&self.branch, BranchType::Local).is_err() {
            if let Ok(oid) = repo.refname_to_id(&self.remote_ref()) {
                let commit = repo.find_commit(oid)?;
                repo.branch(&self.branch, &commit, true)?;
            }
        }
        repo.set_head(&self.local_ref())?;
        Ok(())
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let username = self.username.clone();
        let token = self.token.clone();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, allowed| {
            if allowed.is_user_pass_plaintext() {
                if let Some(token) = token.as_deref() {
                    return Cred::userpass_plaintext(&username, token);
                }
            }
            if allowed.is_ssh_key() {
                if let Some(user) = username_from_url {
                    return Cred::ssh_key_from_agent(user);
                }
            }
            Cred::default()
        });
        callbacks
    }

    /// Fetch the configured branch from `origin`. A missing remote branch
    /// surfaces as [`SyncError::RemoteBranchAbsent`] so callers can treat
    /// it as "nothing there yet" rather than a failure.
    pub fn fetch(&self, repo: &Repository) -> Result<(), SyncError> {
        if self.remote_url.is_none() {
            return Ok(());
        }
        let mut remote = match repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(_) => return Ok(()),
        };
        let refspec = format!("{}:{}", self.local_ref(), self.remote_ref());
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(self.callbacks());
        remote
            .fetch(&[refspec.as_str()], Some(&mut opts), None)
            .map_err(|err| self.classify_fetch_error(err))?;
        // Some transports report a refspec that matched nothing as a
        // successful no-op fetch; the tracking ref is the ground truth.
        if repo.refname_to_id(&self.remote_ref()).is_err() {
            return Err(SyncError::RemoteBranchAbsent(self.branch.clone()));
        }
        Ok(())
    }

    fn classify_fetch_error(&self, err: git2::Error) -> SyncError {
        let message = err.message().to_ascii_lowercase();
        let absent = err.code() == git2::ErrorCode::NotFound
            || message.contains("couldn't find remote ref")
            || message.contains("not found");
        if absent {
            SyncError::RemoteBranchAbsent(self.branch.clone())
        } else {
            SyncError::Fetch(err)
        }
    }

    fn remote_tree<'r>(&self, repo: &'r Repository) -> Option<git2::Tree<'r>> {
        let oid = repo.refname_to_id(&self.remote_ref()).ok()?;
        let commit = repo.find_commit(oid).ok()?;
        commit.tree().ok()
    }

    /// Names of files directly under `dir` in the fetched remote tree,
    /// filtered to `.json` and extension-stripped. Empty when the remote
    /// branch (or the directory) does not exist.
    pub fn list_remote_buckets(&self, repo: &Repository, dir: &str) -> Vec<String> {
        let mut buckets = Vec::new();
        let Some(tree) = self.remote_tree(repo) else {
            return buckets;
        };
        let entry = match tree.get_path(Path::new(dir)) {
            Ok(entry) => entry,
            Err(_) => return buckets,
        };
        let object = match entry.to_object(repo) {
            Ok(object) => object,
            Err(_) => return buckets,
        };
        let Some(subtree) = object.as_tree() else {
            return buckets;
        };
        for entry in subtree.iter() {
            if let Some(name) = entry.name() {
                if let Some(stem) = name.strip_suffix(".json") {
                    buckets.push(stem.to_string());
                }
            }
        }
        buckets.sort();
        buckets
    }

    /// Blob content at `path` in the fetched remote tree; `None` on any
    /// failure (absent branch, absent file, non-blob entry).
    pub fn read_remote_file(&self, repo: &Repository, path: &Path) -> Option<Vec<u8>> {
        let tree = self.remote_tree(repo)?;
        read_tree_file(repo, &tree, path)
    }

    /// Blob content at `path` in the local HEAD commit — the snapshot as
    /// of the last successful sync, used as the merge base. `None` before
    /// the first commit.
    pub fn read_head_file(&self, repo: &Repository, path: &Path) -> Option<Vec<u8>> {
        let tree = repo.head().ok()?.peel_to_commit().ok()?.tree().ok()?;
        read_tree_file(repo, &tree, path)
    }

    /// Stage the whole working tree. Returns whether anything differed from
    /// HEAD/index (nothing staged means nothing to commit).
    pub fn stage_all(&self, repo: &Repository) -> Result<bool, SyncError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = repo.statuses(Some(&mut opts)).map_err(SyncError::Stage)?;
        if statuses.is_empty() {
            return Ok(false);
        }

        let mut index = repo.index().map_err(SyncError::Stage)?;
        index
            .add_all(["*"], IndexAddOption::DEFAULT, None)
            .map_err(SyncError::Stage)?;
        // Picks up workdir deletions of already-tracked paths.
        index.update_all(["*"], None).map_err(SyncError::Stage)?;
        index.write().map_err(SyncError::Stage)?;
        Ok(true)
    }

    /// Commit the staged index onto the configured branch with the fixed
    /// author identity. An unborn branch parents onto `origin/<branch>`
    /// when that exists, keeping history linear on bootstrap.
    pub fn commit(&self, repo: &Repository, message: &str) -> Result<(), SyncError> {
        let signature =
            Signature::now(COMMIT_NAME, COMMIT_EMAIL).map_err(SyncError::Commit)?;
        let mut index = repo.index().map_err(SyncError::Commit)?;
        let tree_oid = index.write_tree().map_err(SyncError::Commit)?;
        let tree = repo.find_tree(tree_oid)?;

        let parent = self.head_commit(repo).or_else(|| {
            let oid = repo.refname_to_id(&self.remote_ref()).ok()?;
            repo.find_commit(oid).ok()
        });
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(SyncError::Commit)?;
        Ok(())
    }

    fn head_commit<'r>(&self, repo: &'r Repository) -> Option<Commit<'r>> {
        repo.head().ok()?.peel_to_commit().ok()
    }

    /// Force-push the branch to `origin`. No-op without a configured
    /// remote.
    pub fn push(&self, repo: &Repository) -> Result<(), SyncError> {
        if self.remote_url.is_none() {
            return Ok(());
        }
        let mut remote = match repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(_) => return Ok(()),
        };

        let refspec = format!("+{}:{}", self.local_ref(), self.local_ref());
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|_refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(message.to_string());
                }
                Ok(())
            });
            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            remote
                .push(&[refspec.as_str()], Some(&mut opts))
                .map_err(SyncError::Push)?;
        }
        if let Some(message) = rejection.into_inner() {
            return Err(SyncError::PushRejected { message });
        }
        Ok(())
    }

    /// Destructive history reset for compaction: drop `.git` entirely and
    /// start over with the same branch and remote.
    pub fn reinit(&self) -> Result<Repository, SyncError> {
        let git_dir = self.workdir.join(".git");
        if git_dir.exists() {
            fs::remove_dir_all(&git_dir)?;
        }
        self.ensure_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(workdir: &Path, remote: Option<&Path>) -> RepoSpec {
        RepoSpec {
            workdir: workdir.to_path_buf(),
            branch: "main".to_string(),
            remote_url: remote.map(|p| p.to_string_lossy().into_owned()),
            username: "git".to_string(),
            token: None,
        }
    }

    fn bare_remote(path: &Path) -> Repository {
        Repository::init_bare(path).expect("init bare remote")
    }

    #[test]
    fn ensure_open_initializes_with_origin() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote.git");
        let work = dir.path().join("work");
        bare_remote(&remote_dir);

        let spec = spec(&work, Some(&remote_dir));
        let repo = spec.ensure_open().unwrap();
        assert!(repo.find_remote("origin").is_ok());
        // Idempotent.
        let repo = spec.ensure_open().unwrap();
        assert!(repo.find_remote("origin").is_ok());
    }

    #[test]
    fn fetch_of_missing_remote_branch_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote.git");
        let work = dir.path().join("work");
        bare_remote(&remote_dir);

        let spec = spec(&work, Some(&remote_dir));
        let repo = spec.ensure_open().unwrap();
        spec.ensure_branch(&repo).unwrap();

        let err = spec.fetch(&repo).unwrap_err();
        assert!(err.is_remote_branch_absent(), "got: {err}");
    }

    #[test]
    fn commit_push_fetch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote.git");
        let work = dir.path().join("work");
        bare_remote(&remote_dir);

        let spec = spec(&work, Some(&remote_dir));
        let repo = spec.ensure_open().unwrap();
        spec.ensure_branch(&repo).unwrap();

        fs::create_dir_all(work.join("data")).unwrap();
        fs::write(work.join("data/ab.json"), b"{}").unwrap();

        assert!(spec.stage_all(&repo).unwrap());
        spec.commit(&repo, "sync: test").unwrap();
        spec.push(&repo).unwrap();
        spec.fetch(&repo).unwrap();

        assert_eq!(spec.list_remote_buckets(&repo, "data"), vec!["ab".to_string()]);
        let blob = spec
            .read_remote_file(&repo, Path::new("data/ab.json"))
            .unwrap();
        assert_eq!(blob, b"{}");

        // Nothing changed; nothing to stage.
        assert!(!spec.stage_all(&repo).unwrap());
    }

    #[test]
    fn reinit_discards_history() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");

        let spec = spec(&work, None);
        let repo = spec.ensure_open().unwrap();
        spec.ensure_branch(&repo).unwrap();
        fs::write(work.join("keep.txt"), b"x").unwrap();
        assert!(spec.stage_all(&repo).unwrap());
        spec.commit(&repo, "sync: seed").unwrap();
        drop(repo);

        let repo = spec.reinit().unwrap();
        assert!(repo.head().is_err(), "fresh repo has an unborn head");
        // Working tree survives the reset.
        assert!(work.join("keep.txt").exists());
    }
}
