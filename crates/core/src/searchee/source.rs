//! Searchee constructors for the three content sources.

use std::fs;
use std::path::Path;

use crate::client::ClientTorrent;
use crate::metainfo::{self, FileEntry};

use super::types::{Searchee, SearcheeError, SearcheeOrigin};

/// Files clients and users drop into content directories that are not part
/// of the payload.
const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Build a searchee from raw `.torrent` bytes.
pub fn from_torrent_bytes(bytes: &[u8]) -> Result<Searchee, SearcheeError> {
    let meta = metainfo::parse(bytes)?;
    let trackers = meta.announce.iter().cloned();
    Ok(
        Searchee::new(meta.name.clone(), meta.files, Some(meta.info_hash), SearcheeOrigin::TorrentFile)
            .with_trackers(trackers),
    )
}

/// Build a searchee from a `.torrent` file on disk.
pub fn from_torrent_path(path: &Path) -> Result<Searchee, SearcheeError> {
    let bytes = fs::read(path).map_err(|source| SearcheeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_torrent_bytes(&bytes)
}

/// Build a searchee from a data directory.
///
/// Enumerates regular files recursively with paths relative to the
/// directory root, in lexicographic order. Symlinks are not traversed and
/// no info-hash is available.
pub fn from_data_dir(dir: &Path) -> Result<Searchee, SearcheeError> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    if files.is_empty() {
        return Err(SearcheeError::EmptyDirectory(dir.display().to_string()));
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(Searchee::new(name, files, None, SearcheeOrigin::DataDir)
        .with_content_root(dir.display().to_string()))
}

/// Build a searchee from a client-reported torrent.
pub fn from_client_torrent(torrent: &ClientTorrent) -> Searchee {
    let mut searchee = Searchee::new(
        torrent.name.clone(),
        torrent.files.clone(),
        Some(torrent.info_hash),
        SearcheeOrigin::Client,
    )
    .with_trackers(torrent.trackers.iter().cloned());
    if let Some(save_path) = &torrent.save_path {
        searchee = searchee.with_content_root(save_path.clone());
    }
    searchee
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<FileEntry>) -> Result<(), SearcheeError> {
    let entries = fs::read_dir(dir).map_err(|source| SearcheeError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| SearcheeError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).map_err(|source| SearcheeError::Io {
            path: path.display().to_string(),
            source,
        })?;

        if meta.file_type().is_symlink() {
            continue;
        }
        if meta.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }
        if !meta.is_file() || meta.len() == 0 {
            continue;
        }
        let file_name = entry.file_name();
        if IGNORED_FILES
            .iter()
            .any(|ignored| file_name.as_os_str() == std::ffi::OsStr::new(ignored))
        {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .expect("walked paths are under the root")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        out.push(FileEntry::new(relative, meta.len()));
    }
    Ok(())
}
