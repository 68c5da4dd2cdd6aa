//! Manifest commands: `check`, `features`, and `groups`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use corewire::config::Config;
use corewire::imports::{ImportManager, ModuleCatalog};
use corewire::log_component;
use corewire::validator::{
    DependencyManifest, DependencyValidator, Environment, FeatureStatus, ValidationResult,
};

/// Pick the manifest from the flag, then from config.
fn manifest_path(config: &Config, flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(|| config.validator.manifest_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| {
            anyhow!(
                "no manifest given; pass --manifest or set validator.manifest_path in {}",
                Config::path().display()
            )
        })
}

fn load_manifest(config: &Config, flag: Option<PathBuf>) -> Result<DependencyManifest> {
    let path = manifest_path(config, flag)?;
    DependencyManifest::load(&path)
        .with_context(|| format!("failed to load manifest {}", path.display()))
}

fn validate(manifest: &DependencyManifest, environment: Environment) -> ValidationResult {
    // The CLI links no optional modules, so the catalog is empty and only
    // `bin:` identifiers can resolve.
    let imports = ImportManager::standard(Arc::new(ModuleCatalog::new()));
    DependencyValidator::new(&imports, environment).validate(manifest)
}

/// Run the startup check. Returns `false` when a required dependency failed.
pub fn cmd_check(
    config: &Config,
    manifest: Option<PathBuf>,
    environment: Environment,
    json: bool,
) -> Result<bool> {
    let manifest = load_manifest(config, manifest)?;
    let result = validate(&manifest, environment);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result);
    }

    for warning in &result.warnings {
        log_component!(warn, "validator", "dependency warning", detail = warning.as_str());
    }
    Ok(result.is_ok())
}

pub fn cmd_features(
    config: &Config,
    manifest: Option<PathBuf>,
    environment: Environment,
) -> Result<()> {
    let manifest = load_manifest(config, manifest)?;
    if manifest.feature_dependencies.is_empty() {
        println!("No features declared.");
        return Ok(());
    }

    let result = validate(&manifest, environment);
    for (feature, status) in result.feature_status(&manifest) {
        let icon = match status {
            FeatureStatus::Available => "[OK]   ",
            FeatureStatus::Degraded { .. } => "[WARN] ",
            FeatureStatus::Unavailable { .. } => "[ERROR]",
        };
        println!("  {} {}: {}", icon, feature, status);
    }
    Ok(())
}

pub fn cmd_groups(config: &Config, manifest: Option<PathBuf>, name: Option<&str>) -> Result<()> {
    let manifest = load_manifest(config, manifest)?;

    if let Some(name) = name {
        let command = manifest
            .group_install_command(name)
            .ok_or_else(|| anyhow!("unknown or empty dependency group '{}'", name))?;
        println!("{}", command);
        return Ok(());
    }

    if manifest.dependency_groups.is_empty() {
        println!("No dependency groups declared.");
        return Ok(());
    }
    for (group, def) in &manifest.dependency_groups {
        match &def.description {
            Some(description) => println!("{} - {}", group, description),
            None => println!("{}", group),
        }
        println!("  dependencies: {}", def.dependencies.join(", "));
        if let Some(command) = manifest.group_install_command(group) {
            println!("  install: {}", command);
        }
    }
    Ok(())
}
