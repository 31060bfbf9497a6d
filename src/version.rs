//! Codex version resolution
//!
//! The version is taken from the command line when given, otherwise from the
//! environment value handed in by the caller, then from the project's
//! `package.json` (`engines.codex`) and finally from `.codexfactory.json`.

use crate::error::{FactoryError, Result};
use regex::Regex;
use semver::{Version, VersionReq};
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

/// Environment key holding an externally configured version
pub const VERSION_ENV_KEY: &str = "CODEX_FACTORY_VERSION";

/// Codex releases this factory can start
pub const SUPPORTED_CODEX: &str = ">=0.1.0";

fn release_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("valid release regex"))
}

fn commit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[a-f0-9]{7,10}$").expect("valid commit regex"))
}

/// Find the version to run when none was passed explicitly
pub fn resolve_version(
    explicit: Option<&str>,
    from_env: Option<&str>,
    project_dir: &Path,
) -> Result<String> {
    if let Some(version) = explicit.or(from_env).filter(|v| !v.is_empty()) {
        return Ok(version.to_string());
    }

    if let Some(version) = read_json_field(&project_dir.join("package.json"), &["engines", "codex"]) {
        tracing::info!("Codex version not specified, using package.json engines.codex");
        return Ok(version);
    }

    if let Some(version) = read_json_field(&project_dir.join(".codexfactory.json"), &["version"]) {
        tracing::info!("Codex version not specified, using .codexfactory.json");
        return Ok(version);
    }

    Err(FactoryError::InvalidConfig(
        "Codex version was not specified nor is it present in expected external places".to_string(),
    ))
}

/// Normalize a version into an image tag
pub fn validate_version(version: &str) -> Result<String> {
    if version == "latest" {
        return Ok(version.to_string());
    }

    if release_regex().is_match(version) {
        check_supported(version)?;
        return Ok(version.to_string());
    }

    if commit_regex().is_match(version) {
        return Ok(format!("sha-{}", version));
    }

    Err(FactoryError::UnsupportedVersion(format!(
        "\"{}\" does not have the expected format",
        version
    )))
}

fn check_supported(version: &str) -> Result<()> {
    let supported = VersionReq::parse(SUPPORTED_CODEX)
        .map_err(|e| FactoryError::InvalidConfig(format!("supported range: {}", e)))?;
    let release = Version::parse(version)
        .map_err(|e| FactoryError::UnsupportedVersion(format!("\"{}\": {}", version, e)))?;

    if !supported.matches(&release) {
        return Err(FactoryError::UnsupportedVersion(format!(
            "this factory supports Codex {}, but {} was requested",
            SUPPORTED_CODEX, version
        )));
    }

    Ok(())
}

fn read_json_field(path: &Path, keys: &[&str]) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let root: Value = serde_json::from_str(&contents).ok()?;
    let mut value = &root;

    for key in keys {
        value = value.get(key)?;
    }

    value.as_str().map(str::to_string)
}
