//! Startup validation of external dependencies against a manifest.
//!
//! The validator resolves every manifest entry through the [`ImportManager`],
//! checks exposed versions against constraints, and collects the outcome in a
//! [`ValidationResult`]. It never fails: callers decide what to do with the
//! result, typically via [`ValidationResult::ensure_ok`] at startup.

mod manifest;
mod version;

pub use manifest::{
    DependencyClass, DependencyGroup, DependencyManifest, DependencySections, FeatureDependencies,
    ManifestEntry,
};
pub use version::{parse_lenient, ConstraintOp, VersionConflict, VersionConstraint};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{CorewireError, Result};
use crate::imports::ImportManager;

// ============================================================================
// Environment
// ============================================================================

/// Deployment environment; controls whether development entries are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }

    pub fn includes_development(&self) -> bool {
        matches!(self, Environment::Development | Environment::Test)
    }
}

impl FromStr for Environment {
    type Err = CorewireError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" | "testing" => Ok(Environment::Test),
            other => Err(CorewireError::Config(format!(
                "unknown environment '{}' (expected production, development, or test)",
                other
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Results
// ============================================================================

/// A manifest entry that resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDependency {
    pub name: String,
    pub class: DependencyClass,
    /// Identifier that actually loaded: the entry's import identifier or one of its alternatives.
    pub via: String,
    pub version: Option<String>,
}

/// Availability of a feature given the resolved dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FeatureStatus {
    Available,
    /// Required dependencies present, some optional ones missing.
    Degraded { missing: Vec<String> },
    /// At least one required dependency missing.
    Unavailable { missing: Vec<String> },
}

impl FeatureStatus {
    pub fn is_available(&self) -> bool {
        !matches!(self, FeatureStatus::Unavailable { .. })
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureStatus::Available => f.write_str("available"),
            FeatureStatus::Degraded { missing } => {
                write!(f, "degraded (missing {})", missing.join(", "))
            }
            FeatureStatus::Unavailable { missing } => {
                write!(f, "unavailable (missing {})", missing.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub environment: Environment,
    pub missing_required: Vec<String>,
    pub missing_optional: Vec<String>,
    /// Required entries whose installed version violates the constraint.
    pub version_conflicts: Vec<VersionConflict>,
    pub warnings: Vec<String>,
    pub installation_instructions: Vec<String>,
    pub resolved: Vec<ResolvedDependency>,
}

impl ValidationResult {
    /// `true` when nothing required is missing or conflicting.
    pub fn is_ok(&self) -> bool {
        self.missing_required.is_empty() && self.version_conflicts.is_empty()
    }

    /// Turn required failures into an error for fail-fast startup.
    pub fn ensure_ok(&self) -> Result<()> {
        if !self.missing_required.is_empty() {
            return Err(CorewireError::MissingRequired(self.missing_required.clone()));
        }
        match self.version_conflicts.first() {
            Some(conflict) => Err(CorewireError::VersionConflict(conflict.clone())),
            None => Ok(()),
        }
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.resolved.iter().any(|r| r.name == name)
    }

    /// Per-feature availability derived from what resolved.
    pub fn feature_status(&self, manifest: &DependencyManifest) -> BTreeMap<String, FeatureStatus> {
        let resolved: HashSet<&str> = self.resolved.iter().map(|r| r.name.as_str()).collect();
        let missing = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .filter(|n| !resolved.contains(n.as_str()))
                .cloned()
                .collect()
        };

        manifest
            .feature_dependencies
            .iter()
            .map(|(feature, deps)| {
                let required = missing(&deps.required);
                let optional = missing(&deps.optional);
                let status = if !required.is_empty() {
                    FeatureStatus::Unavailable { missing: required }
                } else if !optional.is_empty() {
                    FeatureStatus::Degraded { missing: optional }
                } else {
                    FeatureStatus::Available
                };
                (feature.clone(), status)
            })
            .collect()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dependency check ({})", self.environment)?;
        writeln!(f)?;
        for dep in &self.resolved {
            let version = dep.version.as_deref().unwrap_or("unknown version");
            if dep.via == dep.name {
                writeln!(f, "  [OK]    {} ({})", dep.name, version)?;
            } else {
                writeln!(f, "  [OK]    {} via {} ({})", dep.name, dep.via, version)?;
            }
        }
        for name in &self.missing_required {
            writeln!(f, "  [ERROR] {}: required dependency not found", name)?;
        }
        for conflict in &self.version_conflicts {
            writeln!(f, "  [ERROR] {}", conflict)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  [WARN]  {}", warning)?;
        }

        if !self.installation_instructions.is_empty() {
            writeln!(f)?;
            writeln!(f, "To install missing dependencies:")?;
            for line in &self.installation_instructions {
                writeln!(f, "  {}", line)?;
            }
        }

        writeln!(f)?;
        if self.is_ok() {
            write!(
                f,
                "{} resolved, {} warning(s)",
                self.resolved.len(),
                self.warnings.len()
            )
        } else {
            write!(
                f,
                "{} required dependency problem(s)",
                self.missing_required.len() + self.version_conflicts.len()
            )
        }
    }
}

// ============================================================================
// Validator
// ============================================================================

pub struct DependencyValidator<'a> {
    imports: &'a ImportManager,
    environment: Environment,
}

impl<'a> DependencyValidator<'a> {
    pub fn new(imports: &'a ImportManager, environment: Environment) -> Self {
        Self {
            imports,
            environment,
        }
    }

    /// Check every applicable entry of `manifest`.
    pub fn validate(&self, manifest: &DependencyManifest) -> ValidationResult {
        let mut result = ValidationResult {
            environment: self.environment,
            ..Default::default()
        };

        for (class, entry) in manifest.entries() {
            if class == DependencyClass::Development && !self.environment.includes_development() {
                debug!(dependency = %entry.name, "Skipping development dependency");
                continue;
            }
            self.check_entry(class, entry, &mut result);
        }

        if result.is_ok() {
            info!(
                resolved = result.resolved.len(),
                warnings = result.warnings.len(),
                "Dependency validation passed"
            );
        } else {
            error!(
                missing = ?result.missing_required,
                conflicts = result.version_conflicts.len(),
                "Dependency validation failed"
            );
        }
        result
    }

    fn check_entry(&self, class: DependencyClass, entry: &ManifestEntry, result: &mut ValidationResult) {
        let primary = entry.import_target();
        let found = match self.imports.import_module(primary) {
            Ok(module) => Some((primary.to_string(), module.version())),
            Err(failure) => {
                debug!(dependency = %entry.name, error = %failure, "Primary import failed");
                entry.alternatives.iter().find_map(|alt| {
                    self.imports
                        .import_module(alt)
                        .ok()
                        .map(|module| (alt.clone(), module.version()))
                })
            }
        };

        let Some((via, version)) = found else {
            self.record_missing(class, entry, result);
            return;
        };

        if via != primary {
            let message = format!("{}: not found, using alternative {}", entry.name, via);
            warn!(dependency = %entry.name, alternative = %via, "Using alternative dependency");
            result.warnings.push(message);
            result.resolved.push(ResolvedDependency {
                name: entry.name.clone(),
                class,
                via,
                version,
            });
            return;
        }

        if let Err(conflict) = self.check_version(entry, version.as_deref(), result) {
            match class {
                DependencyClass::Required => {
                    error!(error = %conflict, "Required dependency version conflict");
                    result
                        .installation_instructions
                        .push(instruction(entry));
                    result.version_conflicts.push(conflict);
                }
                _ => {
                    warn!(error = %conflict, "Optional dependency version conflict");
                    result.warnings.push(format!("{} ({} feature degraded)", conflict, class));
                }
            }
            return;
        }

        result.resolved.push(ResolvedDependency {
            name: entry.name.clone(),
            class,
            via,
            version,
        });
    }

    /// Compare the exposed version with the entry's constraint.
    ///
    /// Unknown or unparseable versions pass with a warning.
    fn check_version(
        &self,
        entry: &ManifestEntry,
        version: Option<&str>,
        result: &mut ValidationResult,
    ) -> std::result::Result<(), VersionConflict> {
        let constraint = match entry.constraint() {
            Ok(Some(c)) => c,
            Ok(None) => return Ok(()),
            Err(e) => {
                result
                    .warnings
                    .push(format!("{}: {}; version not checked", entry.name, e));
                return Ok(());
            }
        };

        let Some(found) = version else {
            result.warnings.push(format!(
                "{}: version unknown, constraint {} not checked",
                entry.name, constraint
            ));
            return Ok(());
        };

        match constraint.check(&entry.name, found)? {
            true => Ok(()),
            false => {
                result.warnings.push(format!(
                    "{}: unrecognized version '{}', constraint {} not checked",
                    entry.name, found, constraint
                ));
                Ok(())
            }
        }
    }

    fn record_missing(&self, class: DependencyClass, entry: &ManifestEntry, result: &mut ValidationResult) {
        result.installation_instructions.push(instruction(entry));
        match class {
            DependencyClass::Required => {
                error!(dependency = %entry.name, "Required dependency missing");
                result.missing_required.push(entry.name.clone());
            }
            DependencyClass::Optional | DependencyClass::Development => {
                warn!(dependency = %entry.name, class = %class, "Optional dependency missing");
                let impact = entry.purpose.as_deref().unwrap_or("related features degraded");
                result
                    .warnings
                    .push(format!("{}: {} dependency not found ({})", entry.name, class, impact));
                result.missing_optional.push(entry.name.clone());
            }
        }
    }
}

fn instruction(entry: &ManifestEntry) -> String {
    match &entry.purpose {
        Some(purpose) => format!("{}: {}  # {}", entry.name, entry.install_target(), purpose),
        None => format!("{}: {}", entry.name, entry.install_target()),
    }
}
