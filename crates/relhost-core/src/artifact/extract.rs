use std::{
    cell::Cell,
    fs, io,
    io::Read,
    path::{Component, Path, PathBuf},
    rc::Rc,
};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::trace;

use super::FetchError;

/// How an archive is laid out on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Leading path components dropped from every entry (like `tar --strip-components`).
    pub strip_components: usize,
    /// File that must exist once extraction finished, relative to the destination.
    pub entrypoint: Option<String>,
}

/// Unpack a gzip-compressed tar stream into `dest`. Returns the number of entries written.
pub(crate) fn unpack<R: Read>(
    reader: R,
    dest: &Path,
    opts: &ExtractOptions,
) -> Result<usize, FetchError> {
    fs::create_dir_all(dest)?;
    let root = dest.canonicalize()?;

    let stream_failure = Rc::new(Cell::new(None));
    let mut archive = Archive::new(Tracked {
        inner: GzDecoder::new(reader),
        failure: stream_failure.clone(),
    });
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let read_err = |e: io::Error| archive_error(e, stream_failure.get());
    let mut written = 0;
    for entry in archive.entries().map_err(read_err)? {
        let mut entry = entry.map_err(read_err)?;

        match entry.header().entry_type() {
            EntryType::Regular | EntryType::Directory | EntryType::Symlink => {}
            other => {
                trace!(kind = ?other, "skipping unsupported archive entry");
                continue;
            }
        }

        let path = entry.path().map_err(read_err)?.into_owned();
        let Some(rel) = strip(&path, opts.strip_components)? else {
            continue;
        };

        let target = root.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
            // A symlink unpacked earlier must not redirect later entries outside the root.
            if !parent.canonicalize()?.starts_with(&root) {
                return Err(FetchError::CorruptArchive(format!(
                    "entry {} escapes the release directory",
                    path.display()
                )));
            }
        }
        entry
            .unpack(&target)
            .map_err(|e| unpack_error(e, stream_failure.get()))?;
        written += 1;
    }

    if let Some(entrypoint) = &opts.entrypoint {
        if !root.join(entrypoint).is_file() {
            return Err(FetchError::CorruptArchive(format!(
                "entrypoint {entrypoint} missing from archive"
            )));
        }
    }
    Ok(written)
}

/// Drop `n` leading components; `None` when nothing is left.
fn strip(path: &Path, n: usize) -> Result<Option<PathBuf>, FetchError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part),
            _ => {
                return Err(FetchError::CorruptArchive(format!(
                    "unsafe entry path {}",
                    path.display()
                )));
            }
        }
    }
    if parts.len() <= n {
        return Ok(None);
    }
    Ok(Some(parts[n..].iter().collect()))
}

/// Archive reader that remembers the kind of the first error raised by the stream or the
/// gzip decoder.
struct Tracked<R> {
    inner: R,
    failure: Rc<Cell<Option<io::ErrorKind>>>,
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|e| {
            if e.kind() != io::ErrorKind::Interrupted && self.failure.get().is_none() {
                self.failure.set(Some(e.kind()));
            }
        })
    }
}

/// Failure while reading the archive: a broken transfer or a malformed archive.
fn archive_error(e: io::Error, stream: Option<io::ErrorKind>) -> FetchError {
    match stream.unwrap_or(e.kind()) {
        io::ErrorKind::ConnectionAborted => FetchError::Transport(e.to_string()),
        _ => FetchError::CorruptArchive(e.to_string()),
    }
}

/// Failure while writing an entry. Unless the stream failed or the entry data is malformed,
/// the local filesystem is at fault.
fn unpack_error(e: io::Error, stream: Option<io::ErrorKind>) -> FetchError {
    if stream.is_some() {
        return archive_error(e, stream);
    }
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            FetchError::CorruptArchive(e.to_string())
        }
        _ => FetchError::Io(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::artifact::testing::{gzip, tar_gz};

    /// Serves `data`, then fails with `kind` instead of reporting end of file.
    struct FailAfter {
        data: Cursor<Vec<u8>>,
        kind: io::ErrorKind,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(self.kind, "stream failed")),
                n => Ok(n),
            }
        }
    }

    /// Poorly compressible bytes so the gzip stream is about as long as the input.
    fn noise(len: usize) -> Vec<u8> {
        let mut x: u32 = 0x9E37_79B9;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x as u8
            })
            .collect()
    }

    fn cut_archive(kind: io::ErrorKind) -> FailAfter {
        let mut archive = tar_gz(&[("index.js", &noise(256 * 1024))]);
        archive.truncate(archive.len() * 3 / 4);
        FailAfter {
            data: Cursor::new(archive),
            kind,
        }
    }

    #[test]
    fn strips_leading_components() {
        let p = |s: &str| strip(Path::new(s), 1).unwrap();
        assert_eq!(p("package/index.js"), Some(PathBuf::from("index.js")));
        assert_eq!(p("./package/lib/a.js"), Some(PathBuf::from("lib/a.js")));
        assert_eq!(p("package/"), None);
        assert_eq!(strip(Path::new("index.js"), 0).unwrap(), Some(PathBuf::from("index.js")));
    }

    #[test]
    fn rejects_traversal() {
        assert!(matches!(
            strip(Path::new("../etc/passwd"), 0),
            Err(FetchError::CorruptArchive(_))
        ));
        assert!(matches!(
            strip(Path::new("/etc/passwd"), 0),
            Err(FetchError::CorruptArchive(_))
        ));
    }

    #[test]
    fn unpacks_with_strip_and_checks_entrypoint() {
        let archive = tar_gz(&[("package/index.js", b"main"), ("package/lib/x.js", b"x")]);
        let dir = tempfile::tempdir().unwrap();
        let opts = ExtractOptions {
            strip_components: 1,
            entrypoint: Some("index.js".into()),
        };

        let written = unpack(Cursor::new(archive), dir.path(), &opts).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read(dir.path().join("index.js")).unwrap(), b"main");
        assert_eq!(fs::read(dir.path().join("lib/x.js")).unwrap(), b"x");
    }

    #[test]
    fn missing_entrypoint_is_corrupt() {
        let archive = tar_gz(&[("server.js", b"main")]);
        let dir = tempfile::tempdir().unwrap();
        let opts = ExtractOptions {
            strip_components: 0,
            entrypoint: Some("index.js".into()),
        };

        let err = unpack(Cursor::new(archive), dir.path(), &opts).unwrap_err();
        assert!(matches!(err, FetchError::CorruptArchive(ref m) if m.contains("index.js")));
    }

    #[test]
    fn gzip_without_tar_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(
            Cursor::new(gzip(&[0xAB; 1500])),
            dir.path(),
            &ExtractOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "corrupt_archive");
    }

    #[test]
    fn plain_bytes_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(
            Cursor::new(b"definitely not gzip".to_vec()),
            dir.path(),
            &ExtractOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "corrupt_archive");
    }

    #[test]
    fn local_write_failure_is_io() {
        let archive = tar_gz(&[("index.js", b"main")]);
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory already sits where the file has to go.
        fs::create_dir_all(dir.path().join("index.js/keep")).unwrap();

        let err = unpack(Cursor::new(archive), dir.path(), &ExtractOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "io", "{err}");
    }

    #[test]
    fn broken_transfer_mid_entry_is_transport() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(
            cut_archive(io::ErrorKind::ConnectionAborted),
            dir.path(),
            &ExtractOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "transport", "{err}");
    }

    #[test]
    fn stream_error_mid_entry_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(
            cut_archive(io::ErrorKind::UnexpectedEof),
            dir.path(),
            &ExtractOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "corrupt_archive", "{err}");
    }

    #[test]
    fn unpack_error_blames_the_disk_only_when_the_stream_is_healthy() {
        let full = io::Error::new(io::ErrorKind::StorageFull, "no space left on device");
        assert_eq!(unpack_error(full, None).kind(), "io");

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "read-only");
        assert_eq!(unpack_error(denied, None).kind(), "io");

        let short = io::Error::new(io::ErrorKind::UnexpectedEof, "short entry");
        assert_eq!(unpack_error(short, None).kind(), "corrupt_archive");

        let reset = io::Error::new(io::ErrorKind::Other, "failed to unpack");
        assert_eq!(
            unpack_error(reset, Some(io::ErrorKind::ConnectionAborted)).kind(),
            "transport"
        );
    }
}
