use memmap2::Mmap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Sentinel path used by diff tools for the missing side of a created or deleted file.
pub const DEV_NULL: &str = "/dev/null";

/// True for POSIX absolute paths (`/x`), bare backslash roots (`\x`) and drive-qualified
/// Windows paths (`c:\x`, `c:/x`), independent of the host platform.
pub fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    match bytes {
        [b'/' | b'\\', ..] => true,
        [drive, b':', b'/' | b'\\', ..] => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

/// Lexically normalize a path: both separators become `/`, empty and `.` segments are dropped
/// and `..` cancels the preceding segment. Never touches the filesystem.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let rooted = unified.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                // `/..` is still `/`
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Remove a leading absolute prefix (drive letter and/or any run of slashes).
/// Relative paths are returned unchanged.
pub fn strip_drive_prefix(path: &str) -> &str {
    let mut rest = path;
    while is_absolute(rest) {
        let bytes = rest.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' {
            rest = &rest[2..];
        }
        rest = rest.trim_start_matches(['/', '\\']);
    }
    rest
}

/// Drop the first `n` `/`-separated segments. When that would leave nothing, the path is
/// returned unchanged.
pub fn strip_components(path: &str, n: usize) -> &str {
    if n == 0 {
        return path;
    }
    let mut rest = path;
    for _ in 0..n {
        match rest.split_once('/') {
            Some((_, tail)) if !tail.is_empty() => rest = tail,
            _ => return path,
        }
    }
    rest
}

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the `Mmap` is live.
pub fn mmap_file(path: &Path) -> std::io::Result<Mmap> {
    let file = std::fs::File::open(path)?;
    // SAFETY: We only read from this mapping and drop it before the file is replaced.
    unsafe { Mmap::map(&file) }
}

/// Read a whole file, mapping it when it is not empty.
pub fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    if std::fs::metadata(path)?.len() == 0 {
        return Ok(Vec::new());
    }
    // Scope the mmap so it is dropped before the caller writes back to the same file.
    // On Windows, replacing a file with an open mapping is an error (os error 1224).
    let map = mmap_file(path)?;
    Ok(map.to_vec())
}

/// Replace `path` with `data` through a temp file in the same directory, so readers see
/// either the old or the new content and never a partial write.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = std::fs::metadata(path).map(|m| m.permissions()).ok();

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
