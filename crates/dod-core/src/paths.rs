use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DOD_DIR: &str = ".dod";

pub const CONFIG_FILE: &str = ".dod/config.yaml";
pub const SPEC_FILE: &str = ".dod/spec.yaml";
pub const METRICS_FILE: &str = ".dod/metrics.yaml";
pub const PERFORMANCE_FILE: &str = ".dod/performance.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn dod_dir(root: &Path) -> PathBuf {
    root.join(DOD_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn performance_path(root: &Path) -> PathBuf {
    root.join(PERFORMANCE_FILE)
}

/// Join a configured path onto `root` unless it is already absolute.
pub fn resolve(root: &Path, configured: &str) -> PathBuf {
    let p = Path::new(configured);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = Path::new("/work/project");
        assert_eq!(resolve(root, ".dod/spec.yaml"), root.join(".dod/spec.yaml"));
        assert_eq!(resolve(root, "/etc/dod.yaml"), PathBuf::from("/etc/dod.yaml"));
    }

    #[test]
    fn helpers_live_under_dod_dir() {
        let root = Path::new("/p");
        assert!(config_path(root).starts_with(dod_dir(root)));
        assert!(performance_path(root).starts_with(dod_dir(root)));
    }
}
