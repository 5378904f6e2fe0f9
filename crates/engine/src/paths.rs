//! Script-addressable path confinement (spec.md §6 "Paths").
//!
//! Every script-addressable file operation resolves its path against one of
//! the configured roots and rejects anything that escapes it. Absolute
//! paths are honored only when they resolve inside the root.

use std::path::{Path, PathBuf};

use crate::{
    config::EngineConfig,
    error::{EngineError, ErrorKind},
};

/// Which configured root a path should be confined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    Data,
    Tree,
    Diagram,
}

impl Root {
    fn base<'a>(self, cfg: &'a EngineConfig) -> &'a Path {
        match self {
            Self::Data => &cfg.data_root,
            Self::Tree => &cfg.tree_root,
            Self::Diagram => &cfg.diagram_root,
        }
    }
}

/// Resolves `requested` against `root`'s configured base directory and
/// rejects any result that would escape it, whether `requested` was
/// relative or absolute.
///
/// Resolution is lexical (does not require the path to exist): `..`
/// components are normalized away before the containment check, so a
/// script cannot escape via a nonexistent intermediate symlink target.
pub fn confine(cfg: &EngineConfig, root: Root, requested: &str) -> Result<PathBuf, EngineError> {
    let base = root.base(cfg);
    let candidate = if Path::new(requested).is_absolute() {
        PathBuf::from(requested)
    } else {
        base.join(requested)
    };

    let normalized = normalize(&candidate);
    let normalized_base = normalize(base);

    if normalized.starts_with(&normalized_base) {
        Ok(normalized)
    } else {
        Err(EngineError::new(
            ErrorKind::Validation,
            format!("path '{requested}' escapes confinement root {}", normalized_base.display()),
        ))
    }
}

/// Lexically collapses `.` and `..` components without touching the
/// filesystem (the path need not exist yet).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.data_root = PathBuf::from("/sandbox/data");
        cfg
    }

    #[test]
    fn relative_path_confined() {
        let p = confine(&cfg(), Root::Data, "orders.csv").unwrap();
        assert_eq!(p, PathBuf::from("/sandbox/data/orders.csv"));
    }

    #[test]
    fn traversal_rejected() {
        let err = confine(&cfg(), Root::Data, "../../etc/passwd").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Validation));
    }

    #[test]
    fn absolute_path_inside_root_honored() {
        let p = confine(&cfg(), Root::Data, "/sandbox/data/sub/orders.csv").unwrap();
        assert_eq!(p, PathBuf::from("/sandbox/data/sub/orders.csv"));
    }

    #[test]
    fn absolute_path_outside_root_rejected() {
        let err = confine(&cfg(), Root::Data, "/etc/passwd").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Validation));
    }
}
