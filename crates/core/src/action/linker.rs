//! Hardlinking of existing data into client-visible paths.

use std::path::Path;

use tokio::fs;
use tracing::debug;

use super::types::ActionError;

/// How a file ended up at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMethod {
    Hardlink,
    Copy,
}

/// Whether two paths live on the same filesystem device. Walks up to the
/// nearest existing ancestor so not-yet-created destinations can be
/// checked.
pub fn same_device(a: &Path, b: &Path) -> std::io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(existing_ancestor_meta(a)?.dev() == existing_ancestor_meta(b)?.dev())
    }
    #[cfg(not(unix))]
    {
        let _ = (a, b);
        Ok(true)
    }
}

#[cfg(unix)]
fn existing_ancestor_meta(path: &Path) -> std::io::Result<std::fs::Metadata> {
    let mut current = path;
    loop {
        match std::fs::metadata(current) {
            Ok(meta) => return Ok(meta),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                current = current.parent().ok_or(e)?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Hardlink `source` to `dest`, creating parent directories. An existing
/// destination is left alone. Cross-device links fall back to a copy when
/// permitted, otherwise fail.
pub async fn link_file(
    source: &Path,
    dest: &Path,
    fallback_copy: bool,
) -> Result<LinkMethod, ActionError> {
    if fs::try_exists(dest).await.unwrap_or(false) {
        debug!(dest = %dest.display(), "Link destination already present");
        return Ok(LinkMethod::Hardlink);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await.map_err(|source| ActionError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    match fs::hard_link(source, dest).await {
        Ok(()) => Ok(LinkMethod::Hardlink),
        Err(e)
            if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) =>
        {
            if !fallback_copy {
                return Err(ActionError::CrossDevice {
                    source_path: source.to_path_buf(),
                    dest: dest.to_path_buf(),
                });
            }
            fs::copy(source, dest).await.map_err(|e| ActionError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;
            Ok(LinkMethod::Copy)
        }
        Err(e) => Err(ActionError::Io {
            path: dest.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().write_all(content).unwrap();
    }

    #[tokio::test]
    async fn test_link_file_creates_hardlink() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src/data.bin");
        let dest = tmp.path().join("links/Show/data.bin");
        write_file(&source, b"payload");

        let method = link_file(&source, &dest, false).await.unwrap();
        assert_eq!(method, LinkMethod::Hardlink);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            assert_eq!(
                std::fs::metadata(&source).unwrap().ino(),
                std::fs::metadata(&dest).unwrap().ino()
            );
        }
    }

    #[tokio::test]
    async fn test_link_file_existing_dest_is_noop() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src.bin");
        let dest = tmp.path().join("dest.bin");
        write_file(&source, b"new");
        write_file(&dest, b"old");

        link_file(&source, &dest, false).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_link_file_missing_source_errors() {
        let tmp = TempDir::new().unwrap();
        let result = link_file(
            &tmp.path().join("missing.bin"),
            &tmp.path().join("dest.bin"),
            false,
        )
        .await;
        assert!(matches!(result, Err(ActionError::Io { .. })));
    }

    #[test]
    fn test_same_device_within_tempdir() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        std::fs::create_dir_all(&a).unwrap();
        // b does not exist yet; the check walks up to the tempdir.
        let b = tmp.path().join("not/yet/created");
        assert!(same_device(&a, &b).unwrap());
    }
}
