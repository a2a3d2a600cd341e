#![allow(dead_code)]

pub mod clock;
pub mod git;

use std::path::Path;

use git_storage::{Config, Store};

/// Local-only store: no remote, no background triggers.
pub fn local_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.data_dir = data_dir.to_path_buf();
    config.auto_sync = false;
    config
}

/// Replica of a shared (filesystem) remote, manual sync only.
pub fn replica_config(data_dir: &Path, remote: &Path) -> Config {
    let mut config = local_config(data_dir);
    config.repo_url = Some(remote.to_string_lossy().into_owned());
    config
}

pub fn open_local(data_dir: &Path) -> Store {
    Store::open(local_config(data_dir)).expect("open local store")
}

pub fn open_replica(data_dir: &Path, remote: &Path) -> Store {
    Store::open(replica_config(data_dir, remote)).expect("open replica store")
}
