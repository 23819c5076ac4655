use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::error::{Error, Result};

/// Package every file under `tree_dir` into a single zip at `archive_path`.
///
/// Entry names are relative to the tree root (the archive root is the tree
/// root, not a nested folder) and each file is streamed through `io::copy`
/// rather than buffered whole. The archive is written to a `.tmp` sibling
/// and renamed into place on success; a failed run leaves no output behind.
pub fn package(tree_dir: &Path, archive_path: &Path) -> Result<()> {
    let meta = fs::metadata(tree_dir)
        .map_err(|e| Error::PackagingFailed(format!("source tree missing: {e}")))?;
    if !meta.is_dir() {
        return Err(Error::PackagingFailed(format!(
            "source tree is not a directory: {}",
            tree_dir.display()
        )));
    }

    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::PackagingFailed(format!("create archive dir: {e}")))?;
    }

    let tmp_path = PathBuf::from(format!("{}.tmp", archive_path.display()));
    let result = write_archive(tree_dir, &tmp_path);

    match result {
        Ok(()) => fs::rename(&tmp_path, archive_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            Error::PackagingFailed(format!("persist archive: {e}"))
        }),
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn write_archive(tree_dir: &Path, out_path: &Path) -> Result<()> {
    let out = fs::File::create(out_path)
        .map_err(|e| Error::PackagingFailed(format!("create archive: {e}")))?;
    let mut writer = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut pending = vec![tree_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir)
            .map_err(|e| Error::PackagingFailed(format!("read {}: {e}", dir.display())))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::PackagingFailed(format!("read dir entry: {e}")))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| Error::PackagingFailed(format!("stat {}: {e}", path.display())))?;

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                // Symlinks and other specials have no place in a generated tree.
                continue;
            }

            let name = entry_name(tree_dir, &path)?;
            writer
                .start_file(&name, options)
                .map_err(|e| Error::PackagingFailed(format!("start entry {name}: {e}")))?;
            let mut f = fs::File::open(&path)
                .map_err(|e| Error::PackagingFailed(format!("open {}: {e}", path.display())))?;
            io::copy(&mut f, &mut writer)
                .map_err(|e| Error::PackagingFailed(format!("write entry {name}: {e}")))?;
        }
    }

    writer
        .finish()
        .map_err(|e| Error::PackagingFailed(format!("finalize archive: {e}")))?;
    Ok(())
}

fn entry_name(tree_dir: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(tree_dir).map_err(|_| {
        Error::PackagingFailed(format!("entry escaped the tree: {}", path.display()))
    })?;
    let name = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(name)
}
