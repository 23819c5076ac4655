use std::path::PathBuf;

/// Root directory for generated trees and archives.
///
/// `BOTFORGE_DATA_ROOT` overrides the default `./data`. Relative paths are
/// resolved against the current directory so child processes spawned with a
/// different cwd still point at the same place.
pub fn data_root() -> PathBuf {
    let raw = std::env::var("BOTFORGE_DATA_ROOT").unwrap_or_else(|_| "./data".to_string());
    let p = PathBuf::from(raw);
    let abs = if p.is_absolute() {
        p
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    };

    // Best-effort canonicalization: don't fail if the directory doesn't exist yet.
    std::fs::canonicalize(&abs).unwrap_or(abs)
}

pub fn trees_root() -> PathBuf {
    data_root().join("trees")
}

pub fn archives_root() -> PathBuf {
    data_root().join("archives")
}

pub fn tree_dir(instance_id: &str) -> PathBuf {
    trees_root().join(instance_id)
}

pub fn archive_path(instance_id: &str) -> PathBuf {
    archives_root().join(format!("{instance_id}.zip"))
}

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}
