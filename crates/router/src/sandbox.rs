//! Path sandboxing: keep filesystem tools inside their workspace root.
//!
//! The check is purely lexical: no filesystem call is made, so a rejected
//! path never touches the disk and the check is safe to run from any task.

use std::path::{Component, Path, PathBuf};

/// Why a requested path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' is outside the workspace root")]
    OutsideRoot { path: String },

    #[error("Path '{path}' is not a valid workspace path")]
    InvalidPath { path: String },
}

/// Resolve `requested` against `root`.
///
/// Rejects any `..` segment outright, even one that would stay inside the
/// root after normalization. Absolute paths are accepted only when they
/// already lie under `root`. Returns the absolute path to operate on.
pub fn resolve_in_root(root: &Path, requested: &str) -> Result<PathBuf, SandboxError> {
    if requested.contains('\0') {
        return Err(SandboxError::InvalidPath { path: requested.into() });
    }

    let normalized = requested.replace('\\', "/");
    let candidate = Path::new(&normalized);

    let mut relative = PathBuf::new();
    let mut absolute = false;
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                return Err(SandboxError::PathTraversal { path: requested.into() });
            }
            Component::RootDir | Component::Prefix(_) => absolute = true,
            Component::CurDir => {}
            Component::Normal(part) => relative.push(part),
        }
    }

    if absolute {
        let full: PathBuf = Path::new("/").join(&relative);
        return match full.strip_prefix(lexical_root(root)) {
            Ok(inside) => Ok(root.join(inside)),
            Err(_) => Err(SandboxError::OutsideRoot { path: requested.into() }),
        };
    }

    Ok(root.join(relative))
}

/// `root` with `.` segments dropped, rooted at `/`, for prefix comparison.
fn lexical_root(root: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in root.components() {
        if let Component::Normal(part) = component {
            out.push(part);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/sessions/abc")
    }

    #[test]
    fn relative_path_joins_root() {
        assert_eq!(
            resolve_in_root(&root(), "src/main.rs").unwrap(),
            PathBuf::from("/sessions/abc/src/main.rs")
        );
    }

    #[test]
    fn current_dir_is_root() {
        assert_eq!(resolve_in_root(&root(), ".").unwrap(), root());
        assert_eq!(resolve_in_root(&root(), "").unwrap(), root());
        assert_eq!(
            resolve_in_root(&root(), "./docs/./a.md").unwrap(),
            PathBuf::from("/sessions/abc/docs/a.md")
        );
    }

    #[test]
    fn parent_segments_are_rejected() {
        for path in ["../../etc/passwd", "docs/../../x", "docs/..", "..", "a\\..\\..\\b"] {
            assert!(
                matches!(
                    resolve_in_root(&root(), path),
                    Err(SandboxError::PathTraversal { .. })
                ),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn parent_segment_inside_root_is_still_rejected() {
        assert!(resolve_in_root(&root(), "docs/../notes.md").is_err());
    }

    #[test]
    fn absolute_inside_root_is_allowed() {
        assert_eq!(
            resolve_in_root(&root(), "/sessions/abc/notes.md").unwrap(),
            PathBuf::from("/sessions/abc/notes.md")
        );
    }

    #[test]
    fn absolute_outside_root_is_rejected() {
        assert_eq!(
            resolve_in_root(&root(), "/etc/passwd"),
            Err(SandboxError::OutsideRoot { path: "/etc/passwd".into() })
        );
        // Shares a string prefix but not a path prefix
        assert!(resolve_in_root(&root(), "/sessions/abcdef/x").is_err());
    }

    #[test]
    fn nul_byte_is_rejected() {
        assert!(matches!(
            resolve_in_root(&root(), "a\0b"),
            Err(SandboxError::InvalidPath { .. })
        ));
    }
}
