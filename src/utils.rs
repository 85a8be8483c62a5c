//! Small validation helpers shared by the repository engine and the
//! project catalog: name and path rules are applied in more than one
//! place (commands, catalog, `find`/`get`) so they live here once.

use crate::errors::CoreError;

/// Project/repository names: ASCII, `[A-Za-z0-9_-]{1,63}`.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.len() > 63 {
        return Err(CoreError::invalid(format!(
            "`{name}` must be 1-63 characters long"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(CoreError::invalid(format!(
            "`{name}` must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(())
}

/// Absolute, `/`-rooted POSIX-style paths with no `..` and no empty
/// segments.
pub fn validate_path(path: &str) -> Result<(), CoreError> {
    if !path.starts_with('/') {
        return Err(CoreError::invalid(format!("`{path}` must be absolute")));
    }
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(CoreError::invalid(format!(
            "`{path}` must not contain empty segments"
        )));
    }
    if segments.iter().any(|s| *s == "..") {
        return Err(CoreError::invalid(format!(
            "`{path}` must not contain `..`"
        )));
    }
    Ok(())
}

/// Splits an absolute path into its directory segments and file name, for
/// walking/building a tree one level at a time.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').skip(1).collect()
}
