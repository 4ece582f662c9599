//! Project and package manifests parsed from `elm.json` files.

use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::{Path, PathBuf},
};

use ecow::EcoString;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{constraint::Constraint, PackageName};

/// A parsed `elm.json`, either an application project or a package release.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Manifest {
    #[serde(rename = "application")]
    Application(ApplicationManifest),
    #[serde(rename = "package")]
    Package(PackageManifest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationManifest {
    pub source_directories: Vec<PathBuf>,
    pub elm_version: Version,
    pub dependencies: AppDependencies,
    #[serde(default)]
    pub test_dependencies: Option<AppDependencies>,
}

/// Application dependencies are pinned to exact versions, split into the
/// packages the project imports directly and the rest of the closure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppDependencies {
    #[serde(default)]
    pub direct: HashMap<PackageName, Version>,
    #[serde(default)]
    pub indirect: HashMap<PackageName, Version>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageManifest {
    pub name: PackageName,
    pub version: Version,
    #[serde(default)]
    pub summary: Option<Box<str>>,
    pub exposed_modules: ExposedModules,
    pub elm_version: Constraint,
    #[serde(default)]
    pub dependencies: BTreeMap<PackageName, Constraint>,
    #[serde(default)]
    pub test_dependencies: BTreeMap<PackageName, Constraint>,
}

/// The `exposed-modules` field: either a flat list, or named groups as used
/// by large packages for sidebar organization. Grouping carries no semantic
/// weight here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExposedModules {
    Flat(Vec<EcoString>),
    Grouped(BTreeMap<Box<str>, Vec<EcoString>>),
}

impl ExposedModules {
    pub fn iter(&self) -> impl Iterator<Item = &EcoString> {
        let flat: Box<dyn Iterator<Item = &EcoString> + '_> = match self {
            ExposedModules::Flat(modules) => Box::new(modules.iter()),
            ExposedModules::Grouped(groups) => {
                Box::new(groups.values().flatten())
            }
        };
        flat
    }

    pub fn contains(&self, module: &str) -> bool {
        self.iter().any(|name| name == module)
    }
}

#[derive(Debug, Error)]
pub enum ManifestLoadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Manifest {
    pub fn load(
        path: impl AsRef<Path>,
    ) -> Result<Manifest, ManifestLoadError> {
        let contents = std::fs::read_to_string(path)?;
        let manifest = serde_json::from_str(&contents)?;
        Ok(manifest)
    }

    /// The source directories of the project, relative to its root.
    pub fn source_directories(&self) -> Vec<PathBuf> {
        match self {
            Manifest::Application(app) => app.source_directories.clone(),
            Manifest::Package(_) => {
                vec![PathBuf::from(super::PACKAGE_SOURCE_DIR)]
            }
        }
    }

    /// The root constraint map handed to the solver.
    ///
    /// Application manifests pin exact versions for the whole dependency
    /// closure; package manifests declare ranges for direct dependencies
    /// only and leave the rest to the solver.
    pub fn solver_constraints(&self) -> BTreeMap<PackageName, Constraint> {
        match self {
            Manifest::Application(app) => {
                let pins = app
                    .dependencies
                    .direct
                    .iter()
                    .chain(app.dependencies.indirect.iter());

                pins.map(|(name, version)| {
                    (name.clone(), Constraint::exactly(version))
                })
                .collect()
            }
            Manifest::Package(package) => package.dependencies.clone(),
        }
    }
}
