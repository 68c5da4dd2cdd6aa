//! Declarative dependency manifest, loaded from YAML, TOML, or JSON.
//!
//! ```yaml
//! dependencies:
//!   required:
//!     - name: git
//!       import_identifier: "bin:git"
//!       version_constraint: ">=2.30"
//!       installation_identifier: "apt install git"
//!       purpose: Repository access
//!   optional:
//!     - name: ripgrep
//!       import_identifier: "bin:rg"
//!       alternatives: ["bin:grep"]
//! feature_dependencies:
//!   search:
//!     required: [git]
//!     optional: [ripgrep]
//! dependency_groups:
//!   tools:
//!     description: Command line helpers
//!     dependencies: [git, ripgrep]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CorewireError, Result};

use super::version::VersionConstraint;

/// How critical a manifest entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyClass {
    Required,
    Optional,
    Development,
}

impl DependencyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyClass::Required => "required",
            DependencyClass::Optional => "optional",
            DependencyClass::Development => "development",
        }
    }
}

impl fmt::Display for DependencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external dependency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestEntry {
    pub name: String,
    pub version_constraint: Option<String>,
    /// Identifier handed to the import manager. Defaults to `name`.
    pub import_identifier: Option<String>,
    /// Install command or package spec shown to the operator. Defaults to `name`.
    pub installation_identifier: Option<String>,
    pub purpose: Option<String>,
    /// Import identifiers accepted in place of this entry.
    pub alternatives: Vec<String>,
    pub category: Option<String>,
}

impl ManifestEntry {
    pub fn import_target(&self) -> &str {
        self.import_identifier.as_deref().unwrap_or(&self.name)
    }

    pub fn install_target(&self) -> &str {
        self.installation_identifier.as_deref().unwrap_or(&self.name)
    }

    pub fn constraint(&self) -> Result<Option<VersionConstraint>> {
        self.version_constraint
            .as_deref()
            .map(str::parse)
            .transpose()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySections {
    pub required: Vec<ManifestEntry>,
    pub optional: Vec<ManifestEntry>,
    pub development: Vec<ManifestEntry>,
}

/// Entry names a feature needs (`required`) or benefits from (`optional`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureDependencies {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

/// A named bundle of entries installable together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyGroup {
    pub description: Option<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyManifest {
    pub dependencies: DependencySections,
    pub feature_dependencies: BTreeMap<String, FeatureDependencies>,
    pub dependency_groups: BTreeMap<String, DependencyGroup>,
}

impl DependencyManifest {
    /// Load by extension: `.yaml`/`.yml`, `.toml`, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CorewireError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(s)
            .map_err(|e| CorewireError::Manifest(format!("invalid YAML manifest: {}", e)))?;
        manifest.check()?;
        Ok(manifest)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(s)
            .map_err(|e| CorewireError::Manifest(format!("invalid TOML manifest: {}", e)))?;
        manifest.check()?;
        Ok(manifest)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(s)
            .map_err(|e| CorewireError::Manifest(format!("invalid JSON manifest: {}", e)))?;
        manifest.check()?;
        Ok(manifest)
    }

    /// All entries with their class, required first.
    pub fn entries(&self) -> impl Iterator<Item = (DependencyClass, &ManifestEntry)> {
        let sections = &self.dependencies;
        sections
            .required
            .iter()
            .map(|e| (DependencyClass::Required, e))
            .chain(sections.optional.iter().map(|e| (DependencyClass::Optional, e)))
            .chain(
                sections
                    .development
                    .iter()
                    .map(|e| (DependencyClass::Development, e)),
            )
    }

    pub fn find(&self, name: &str) -> Option<(DependencyClass, &ManifestEntry)> {
        self.entries().find(|(_, e)| e.name == name)
    }

    /// Install commands for every entry in `group`, joined with `&&`.
    ///
    /// Names that are not manifest entries are used verbatim.
    pub fn group_install_command(&self, group: &str) -> Option<String> {
        let group = self.dependency_groups.get(group)?;
        if group.dependencies.is_empty() {
            return None;
        }
        let commands: Vec<&str> = group
            .dependencies
            .iter()
            .map(|name| {
                self.find(name)
                    .map(|(_, entry)| entry.install_target())
                    .unwrap_or(name.as_str())
            })
            .collect();
        Some(commands.join(" && "))
    }

    /// Names must be present and unique, constraints must parse, and features
    /// may only reference declared entries. Groups may name anything.
    fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (class, entry) in self.entries() {
            if entry.name.trim().is_empty() {
                return Err(CorewireError::Manifest(format!(
                    "{} dependency with empty name",
                    class
                )));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(CorewireError::Manifest(format!(
                    "dependency '{}' is listed more than once",
                    entry.name
                )));
            }
            entry.constraint().map_err(|e| {
                CorewireError::Manifest(format!("dependency '{}': {}", entry.name, e))
            })?;
        }

        for (feature, deps) in &self.feature_dependencies {
            if let Some(unknown) = deps
                .required
                .iter()
                .chain(deps.optional.iter())
                .find(|name| !seen.contains(name.as_str()))
            {
                return Err(CorewireError::Manifest(format!(
                    "feature '{}' references unknown dependency '{}'",
                    feature, unknown
                )));
            }
        }
        Ok(())
    }
}
