//! Whole-file replacement through a sibling temp file.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Write `contents` to `<path>.tmp`, then rename it over `path`.
///
/// Creates the parent directory if needed. Readers see either the old file or
/// the new one.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_file_and_leaves_no_temp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/store.json");

        write_atomic(&path, "first\n").expect("first write");
        write_atomic(&path, "second\n").expect("second write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "second\n");
        assert!(!temp.path().join("nested/store.json.tmp").exists());
    }

    #[test]
    fn temp_file_sits_next_to_target() {
        assert_eq!(
            tmp_path_for(Path::new("/work/rolling-perf.toml")),
            PathBuf::from("/work/rolling-perf.toml.tmp")
        );
    }
}
