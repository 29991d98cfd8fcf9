//! Filesystem collaborator: existence/permission probes, whole-file I/O and
//! directory listings, plus the path-traversal checks the handlers rely on.

use std::ffi::CString;
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

pub fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

pub fn is_directory(path: &Path) -> bool {
    path.is_dir()
}

fn access(path: &Path, mode: libc::c_int) -> bool {
    match CString::new(path.as_os_str().as_bytes()) {
        Ok(c_path) => unsafe { libc::access(c_path.as_ptr(), mode) == 0 },
        Err(_) => false,
    }
}

pub fn is_readable(path: &Path) -> bool {
    access(path, libc::R_OK)
}

pub fn is_writable(path: &Path) -> bool {
    access(path, libc::W_OK)
}

pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

pub fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path)
}

pub fn save_file(path: &Path, content: &[u8]) -> io::Result<()> {
    fs::write(path, content)
}

pub fn delete_file(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

pub fn create_dir(path: &Path, mode: u32) -> io::Result<()> {
    DirBuilder::new().mode(mode).create(path)
}

#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Children of a directory, `.`/`..` excluded, sorted by name for a stable
/// listing.
pub fn list_directory(path: &Path) -> io::Result<Vec<DirEntryInfo>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let is_dir = metadata.is_dir();
        entries.push(DirEntryInfo {
            name,
            is_dir,
            size: if is_dir { 0 } else { metadata.len() },
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

pub fn extension(path: &str) -> Option<&str> {
    let filename = path.rsplit('/').next()?;
    let dot = filename.rfind('.')?;
    if dot == 0 {
        return None; // hidden file, not an extension
    }
    Some(&filename[dot + 1..])
}

/// True when the path contains a `..` segment.
pub fn contains_dot_dot(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

/// Reject traversal attempts and raw control bytes before a URI path is
/// mapped onto the filesystem.
pub fn is_path_secure(path: &str) -> bool {
    if path.is_empty() || contains_dot_dot(path) {
        return false;
    }
    !path.bytes().any(|b| b == 0 || b < 0x20)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_dot_dot() {
        assert!(contains_dot_dot("/upload/../../etc/passwd"));
        assert!(contains_dot_dot(".."));
        assert!(contains_dot_dot("/a/.."));
        assert!(!contains_dot_dot("/a/..b/c"));
        assert!(!contains_dot_dot("/normal/path.txt"));
    }

    #[test]
    fn test_is_path_secure() {
        assert!(is_path_secure("/index.html"));
        assert!(!is_path_secure(""));
        assert!(!is_path_secure("/a/../b"));
        assert!(!is_path_secure("/a\u{0}b"));
        assert!(!is_path_secure("/a\rb"));
    }

    #[test]
    fn test_file_lifecycle() {
        let dir = std::env::temp_dir().join("webserv_fs_tests");
        let _ = std::fs::remove_dir_all(&dir);
        create_dir(&dir, 0o755).unwrap();

        let file = dir.join("f.txt");
        save_file(&file, b"abc").unwrap();
        assert!(exists(&file));
        assert!(!is_directory(&file));
        assert!(is_readable(&file));
        assert!(is_writable(&file));
        assert_eq!(file_size(&file), 3);
        assert_eq!(read_file(&file).unwrap(), b"abc");

        let entries = list_directory(&dir).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "f.txt");
        assert!(!entries[0].is_dir);
        assert_eq!(entries[0].size, 3);

        delete_file(&file).unwrap();
        assert!(!exists(&file));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("/www/index.html"), Some("html"));
        assert_eq!(extension("/www/archive.tar.gz"), Some("gz"));
        assert_eq!(extension("/www/noext"), None);
        assert_eq!(extension("/www/.hidden"), None);
        assert_eq!(extension("/www.dir/file"), None);
    }
}
