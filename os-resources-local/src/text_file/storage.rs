use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::Path;

/// Permission bits for files we create: `rw-r--r--`, never executable.
pub const FILE_MODE: u32 = 0o644;

/// The medium the managed files live on.
///
/// Each method is one blocking call with no retries. Errors are returned
/// untouched so the reconciler can tell `NotFound` apart from the rest.
pub trait Storage: Send + Sync {
    /// Replace whatever is at `path` with `content`, creating the file if
    /// needed.
    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Whether `a` and `b` name the same file, e.g. through `..` or a
    /// symlinked directory. A path that does not exist is never the same
    /// file as anything.
    fn same_file(&self, a: &Path, b: &Path) -> io::Result<bool>;
}

/// Files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl Storage for LocalFilesystem {
    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            // only applies when the file is created; existing modes are kept
            options.mode(FILE_MODE);
        }
        let mut file = options.open(path)?;
        file.write_all(content)?;
        file.flush()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn same_file(&self, a: &Path, b: &Path) -> io::Result<bool> {
        let (Some(a), Some(b)) = (file_id(a)?, file_id(b)?) else {
            return Ok(false);
        };
        Ok(a == b)
    }
}

#[cfg(unix)]
fn file_id(path: &Path) -> io::Result<Option<(u64, u64)>> {
    use std::os::unix::fs::MetadataExt as _;

    match std::fs::metadata(path) {
        Ok(m) => Ok(Some((m.dev(), m.ino()))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn file_id(path: &Path) -> io::Result<Option<std::path::PathBuf>> {
    match std::fs::canonicalize(path) {
        Ok(p) => Ok(Some(p)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_truncates_longer_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        LocalFilesystem.write(&path, b"a long first version").unwrap();
        LocalFilesystem.write(&path, b"short").unwrap();
        assert_eq!(LocalFilesystem.read(&path).unwrap(), b"short");
    }

    #[cfg(unix)]
    #[test]
    fn new_files_are_not_executable() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        LocalFilesystem.write(&path, b"x").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
        // umask may only take bits away
        assert_eq!(mode & 0o777 & !FILE_MODE, 0);
    }

    #[test]
    fn remove_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFilesystem
            .remove(&dir.path().join("missing"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn same_file_sees_through_dot_dot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let path = dir.path().join("a.txt");
        LocalFilesystem.write(&path, b"x").unwrap();

        let alias = dir.path().join("sub/../a.txt");
        assert!(LocalFilesystem.same_file(&alias, &path).unwrap());
        assert!(!LocalFilesystem
            .same_file(&dir.path().join("sub"), &path)
            .unwrap());
    }

    #[test]
    fn same_file_is_false_when_either_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let missing = dir.path().join("missing.txt");
        LocalFilesystem.write(&path, b"x").unwrap();

        assert!(!LocalFilesystem.same_file(&path, &missing).unwrap());
        assert!(!LocalFilesystem.same_file(&missing, &path).unwrap());
        assert!(!LocalFilesystem.same_file(&missing, &missing).unwrap());
    }
}
