//! `pyproject.toml` project descriptor (PEP 621 subset).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use strata_types::{AppReference, PackageName, Requirement, SpecifierSet, Version};

use crate::error::ManifestError;

/// Excludes applied when `[tool.strata] exclude` is absent.
pub const DEFAULT_EXCLUDES: &[&str] = &["**/__pycache__/**", "**/*.pyc"];

#[derive(Deserialize)]
struct RawPyproject {
    project: Option<RawProject>,
    #[serde(default)]
    tool: RawTools,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawProject {
    name: String,
    version: Option<String>,
    requires_python: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

#[derive(Default, Deserialize)]
struct RawTools {
    strata: Option<RawStrataTool>,
}

#[derive(Default, Deserialize)]
struct RawStrataTool {
    packages: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

/// The validated project descriptor.
#[derive(Debug, Clone)]
pub struct ProjectDescriptor {
    path: PathBuf,
    name: PackageName,
    version: Version,
    requires_python: Option<SpecifierSet>,
    dependencies: Vec<Requirement>,
    scripts: BTreeMap<String, AppReference>,
    packages: Vec<String>,
    exclude: Vec<String>,
}

impl ProjectDescriptor {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse descriptor text; `path` is only used for error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ManifestError> {
        let raw: RawPyproject = toml::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let project = raw.project.ok_or_else(|| ManifestError::MissingProject {
            path: path.to_path_buf(),
        })?;
        let invalid = |field: &'static str, message: String| ManifestError::Invalid {
            path: path.to_path_buf(),
            field,
            message,
        };

        let name =
            PackageName::new(&project.name).map_err(|e| invalid("project.name", e.to_string()))?;
        let version = project
            .version
            .ok_or_else(|| invalid("project.version", "a static version is required".into()))?
            .parse::<Version>()
            .map_err(|e| invalid("project.version", e.to_string()))?;
        let requires_python = project
            .requires_python
            .map(|spec| spec.parse::<SpecifierSet>())
            .transpose()
            .map_err(|e| invalid("project.requires-python", e.to_string()))?;

        let mut seen = HashSet::new();
        let mut dependencies = Vec::with_capacity(project.dependencies.len());
        for raw_req in &project.dependencies {
            let req: Requirement = raw_req
                .parse()
                .map_err(|e: strata_types::RequirementParseError| {
                    invalid("project.dependencies", e.to_string())
                })?;
            if !seen.insert(req.name().clone()) {
                return Err(ManifestError::DuplicateRequirement {
                    path: path.to_path_buf(),
                    name: req.name().clone(),
                });
            }
            dependencies.push(req);
        }

        let mut scripts = BTreeMap::new();
        for (script, target) in project.scripts {
            let entry: AppReference = target
                .parse()
                .map_err(|e: strata_types::AppReferenceError| {
                    invalid("project.scripts", format!("{script}: {e}"))
                })?;
            scripts.insert(script, entry);
        }

        let tool = raw.tool.strata.unwrap_or_default();
        let packages = tool
            .packages
            .unwrap_or_else(|| vec![name.as_dist_info_name()]);
        if let Some(bad) = packages.iter().find(|pkg| !is_import_path(pkg)) {
            return Err(invalid(
                "tool.strata.packages",
                format!("'{bad}' is not an importable package name"),
            ));
        }
        let mut exclude: Vec<String> = DEFAULT_EXCLUDES.iter().map(ToString::to_string).collect();
        for pattern in tool.exclude.unwrap_or_default() {
            if !exclude.contains(&pattern) {
                exclude.push(pattern);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            name,
            version,
            requires_python,
            dependencies,
            scripts,
            packages,
            exclude,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    #[must_use]
    pub fn requires_python(&self) -> Option<&SpecifierSet> {
        self.requires_python.as_ref()
    }

    /// Declared requirements, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[Requirement] {
        &self.dependencies
    }

    #[must_use]
    pub fn scripts(&self) -> &BTreeMap<String, AppReference> {
        &self.scripts
    }

    /// Top-level import packages that make up the project's own code.
    #[must_use]
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    #[must_use]
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }
}

fn is_import_path(path: &str) -> bool {
    path.split('/').all(|segment| {
        let mut chars = segment.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_')
    })
}
