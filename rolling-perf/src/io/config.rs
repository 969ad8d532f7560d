//! Harness configuration stored in `<working-directory>/rolling-perf.toml`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::artifacts::ArtifactKinds;
use crate::error::FatalError;
use crate::io::atomic::write_atomic;

/// Harness configuration (TOML).
///
/// Edited by humans; missing fields fall back to defaults, but the watched
/// repository and the build/test commands have no sensible default and must
/// be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RollingConfig {
    /// Truncate in-memory subprocess output beyond this many bytes (logs are complete).
    pub output_limit_bytes: usize,
    pub repo: RepoConfig,
    /// Repositories the test command needs (e.g. the perf harness itself).
    pub support_repos: Vec<SupportRepoConfig>,
    pub build: BuildConfig,
    pub tests: TestsConfig,
    /// External tools that must be present before anything runs.
    pub tools: Vec<ToolConfig>,
    pub upload: UploadConfig,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            output_limit_bytes: 100_000,
            repo: RepoConfig::default(),
            support_repos: Vec::new(),
            build: BuildConfig::default(),
            tests: TestsConfig::default(),
            tools: Vec::new(),
            upload: UploadConfig::default(),
        }
    }
}

/// The watched repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoConfig {
    pub url: String,
    /// Checkout directory name under `repos/`.
    pub name: String,
    /// Remove and re-clone the checkout on every invocation.
    pub fresh_clone: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: "watched".to_string(),
            fresh_clone: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupportRepoConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_support_branch")]
    pub branch: String,
    #[serde(default)]
    pub fresh_clone: bool,
}

fn default_support_branch() -> String {
    "master".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Command template (e.g. `["build.cmd", "-Configuration", "Release"]`).
    pub command: Vec<String>,
    /// Directory to run in, relative to the watched checkout.
    pub workdir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            workdir: PathBuf::from("."),
            timeout_secs: 2 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestsConfig {
    pub command: Vec<String>,
    /// Directory to run in, relative to the watched checkout.
    pub workdir: PathBuf,
    /// Where the runner leaves `<commit>.<kind>` files, relative to the watched checkout.
    pub results_dir: PathBuf,
    pub artifact_kinds: Vec<String>,
    /// Directory whose single non-ignored entry names the build's runtime id.
    pub runtime_id_dir: Option<PathBuf>,
    pub runtime_id_ignore: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            workdir: PathBuf::from("."),
            results_dir: PathBuf::from("."),
            artifact_kinds: ArtifactKinds::default().kinds().to_vec(),
            runtime_id_dir: None,
            runtime_id_ignore: Vec::new(),
            timeout_secs: 4 * 60 * 60,
        }
    }
}

impl TestsConfig {
    pub fn artifact_kinds(&self) -> ArtifactKinds {
        ArtifactKinds::new(self.artifact_kinds.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfig {
    pub name: String,
    /// Command that exits 0 when the tool is usable (e.g. `["msbuild", "-version"]`).
    pub check: Vec<String>,
    /// Optional command run once when the check fails.
    #[serde(default)]
    pub install: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub command: Vec<String>,
    /// Environment variable holding the upload credential.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: Vec::new(),
            token_env: "PERF_RESULTS_TOKEN".to_string(),
            timeout_secs: 30 * 60,
        }
    }
}

impl RollingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.repo.url.trim().is_empty() {
            return Err(anyhow!("repo.url must be set"));
        }
        validate_name("repo.name", &self.repo.name)?;
        let mut names = BTreeSet::from([self.repo.name.as_str()]);
        for support in &self.support_repos {
            validate_name("support_repos.name", &support.name)?;
            if support.url.trim().is_empty() {
                return Err(anyhow!("support repo '{}' must set url", support.name));
            }
            if support.branch.trim().is_empty() {
                return Err(anyhow!("support repo '{}' must set branch", support.name));
            }
            if !names.insert(support.name.as_str()) {
                return Err(anyhow!("duplicate repo name '{}'", support.name));
            }
        }
        validate_command("build.command", &self.build.command)?;
        if self.build.timeout_secs == 0 {
            return Err(anyhow!("build.timeout_secs must be > 0"));
        }
        validate_command("tests.command", &self.tests.command)?;
        if self.tests.timeout_secs == 0 {
            return Err(anyhow!("tests.timeout_secs must be > 0"));
        }
        if self.tests.artifact_kinds().kinds().is_empty() {
            return Err(anyhow!("tests.artifact_kinds must list at least one kind"));
        }
        for tool in &self.tools {
            validate_command(&format!("tools.{}.check", tool.name), &tool.check)?;
        }
        if self.upload.enabled {
            validate_command("upload.command", &self.upload.command)?;
            if self.upload.token_env.trim().is_empty() {
                return Err(anyhow!("upload.token_env must be set when upload is enabled"));
            }
            if self.upload.timeout_secs == 0 {
                return Err(anyhow!("upload.timeout_secs must be > 0"));
            }
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

fn validate_command(label: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{label} must be a non-empty array"));
    }
    Ok(())
}

fn validate_name(label: &str, name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("{label} must be [A-Za-z0-9._-] only (got '{name}')"));
    }
    Ok(())
}

/// Load and validate config from a TOML file.
///
/// A missing, unparsable or invalid file is a [`FatalError`].
pub fn load_config(path: &Path) -> Result<RollingConfig> {
    if !path.exists() {
        return Err(FatalError::new(format!(
            "config file not found at {}",
            path.display()
        ))
        .into());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RollingConfig = toml::from_str(&contents)
        .map_err(|err| FatalError::new(format!("parse {}: {err}", path.display())))?;
    cfg.validate()
        .map_err(|err| FatalError::new(format!("invalid config {}: {err}", path.display())))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RollingConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_fatal;

    fn minimal() -> RollingConfig {
        RollingConfig {
            repo: RepoConfig {
                url: "https://example.invalid/cli.git".to_string(),
                ..RepoConfig::default()
            },
            build: BuildConfig {
                command: vec!["make".to_string()],
                ..BuildConfig::default()
            },
            tests: TestsConfig {
                command: vec!["make".to_string(), "perf".to_string()],
                ..TestsConfig::default()
            },
            ..RollingConfig::default()
        }
    }

    #[test]
    fn load_missing_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_config(&temp.path().join("missing.toml")).unwrap_err();
        assert!(is_fatal(&err));
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("rolling-perf.toml");
        let mut cfg = minimal();
        cfg.support_repos.push(SupportRepoConfig {
            name: "xunit-performance".to_string(),
            url: "https://example.invalid/xunit-performance.git".to_string(),
            branch: "master".to_string(),
            fresh_clone: true,
        });
        cfg.tools.push(ToolConfig {
            name: "msbuild".to_string(),
            check: vec!["msbuild".to_string(), "-version".to_string()],
            install: Vec::new(),
        });
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn parses_hand_written_config_with_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("rolling-perf.toml");
        fs::write(
            &path,
            r#"
output_limit_bytes = 4096

[repo]
url = "https://github.com/dotnet/cli.git"
name = "dotnet-cli"

[[support_repos]]
name = "xunit-performance"
url = "https://github.com/Microsoft/xunit-performance.git"

[build]
command = ["build.cmd", "-Configuration", "Release"]

[tests]
command = ["python", "run-perftests.py", "--runid", "{{ commit_id }}"]
workdir = "test/Performance"
results_dir = "test/Performance"
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.repo.name, "dotnet-cli");
        assert_eq!(cfg.support_repos[0].branch, "master");
        assert_eq!(cfg.build.workdir, PathBuf::from("."));
        assert_eq!(cfg.tests.artifact_kinds, vec!["test.csv", "test.xml"]);
        assert!(!cfg.upload.enabled);
    }

    #[test]
    fn invalid_config_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("rolling-perf.toml");
        fs::write(&path, "[repo]\nurl = \"x\"\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(is_fatal(&err));
        assert!(err.to_string().contains("build.command"));
    }

    #[test]
    fn unparsable_config_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("rolling-perf.toml");
        fs::write(&path, "[repo\nurl = ").expect("write");
        assert!(is_fatal(&load_config(&path).unwrap_err()));
    }

    #[test]
    fn rejects_duplicate_repo_names() {
        let mut cfg = minimal();
        for _ in 0..2 {
            cfg.support_repos.push(SupportRepoConfig {
                name: "harness".to_string(),
                url: "u".to_string(),
                branch: "main".to_string(),
                fresh_clone: false,
            });
        }
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate repo name"));
    }

    #[test]
    fn enabled_upload_requires_command() {
        let mut cfg = minimal();
        cfg.upload.enabled = true;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("upload.command"));
    }
}
