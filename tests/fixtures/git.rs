//! Git helpers for sync tests: a bare directory stands in for the shared
//! HTTP remote (the transport treats both the same way).

use std::path::Path;

use git2::Repository;

pub fn init_bare_remote(path: &Path) {
    Repository::init_bare(path).expect("git init --bare failed");
}

pub fn remote_head(remote: &Path, branch: &str) -> Option<git2::Oid> {
    let repo = Repository::open_bare(remote).ok()?;
    repo.refname_to_id(&format!("refs/heads/{branch}")).ok()
}

pub fn remote_head_message(remote: &Path, branch: &str) -> Option<String> {
    let repo = Repository::open_bare(remote).ok()?;
    let oid = repo.refname_to_id(&format!("refs/heads/{branch}")).ok()?;
    let commit = repo.find_commit(oid).ok()?;
    commit.message().map(str::to_string)
}

pub fn remote_head_parents(remote: &Path, branch: &str) -> Option<usize> {
    let repo = Repository::open_bare(remote).ok()?;
    let oid = repo.refname_to_id(&format!("refs/heads/{branch}")).ok()?;
    let commit = repo.find_commit(oid).ok()?;
    Some(commit.parent_count())
}
