//! The on-disk registry of downloaded package releases.
//!
//! Releases live under `<root>/<author>/<name>/<version>/`, each with its
//! own manifest and `src/` directory; this is the layout the ecosystem's
//! package manager maintains under its home directory. The cache is read
//! once per workspace load and treated as immutable afterwards.

use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::{Path, PathBuf},
};

use semver::Version;
use thiserror::Error;

use super::{
    constraint::Constraint,
    metadata::{Manifest, ManifestLoadError},
    PackageName, MANIFEST_FILE, PACKAGE_SOURCE_DIR,
};

/// A single published version of a package and its declared dependencies.
#[derive(Debug, Clone)]
pub struct Release {
    pub version: Version,
    pub dependencies: BTreeMap<PackageName, Constraint>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("package \"{0}\" is not present in the cache")]
pub struct UnknownPackage(pub PackageName);

#[derive(Debug, Default)]
pub struct PackageCache {
    root: Option<Box<Path>>,
    /// Releases per package, sorted ascending by version.
    packages: HashMap<PackageName, Vec<Release>>,
}

impl PackageCache {
    /// An empty cache, for hosts that operate with no registry at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a cache from in-memory releases; the releases of each package
    /// are sorted by version on the way in.
    pub fn from_releases(
        packages: impl IntoIterator<Item = (PackageName, Vec<Release>)>,
    ) -> Self {
        let packages = packages
            .into_iter()
            .map(|(name, mut releases)| {
                releases.sort_by(|a, b| a.version.cmp(&b.version));
                (name, releases)
            })
            .collect();

        Self {
            root: None,
            packages,
        }
    }

    /// Scans the registry layout under `root`.
    ///
    /// Entries that do not fit the layout — version directories whose names
    /// do not parse, manifests that are missing or malformed — are skipped
    /// with a log line rather than failing the whole scan, since a registry
    /// is often mid-download when we read it.
    pub fn scan(root: impl Into<Box<Path>>) -> io::Result<Self> {
        let root = root.into();
        let mut packages: HashMap<PackageName, Vec<Release>> = HashMap::new();

        for author in read_subdirs(&root)? {
            let author_name = dir_name(&author);

            for package in read_subdirs(&author)? {
                let name: PackageName =
                    format!("{}/{}", author_name, dir_name(&package)).into();

                for release_dir in read_subdirs(&package)? {
                    let Ok(version) = dir_name(&release_dir).parse::<Version>()
                    else {
                        log::warn!(
                            "skipping non-version directory {}",
                            release_dir.display()
                        );
                        continue;
                    };

                    match load_release(&release_dir, version) {
                        Ok(release) => {
                            packages.entry(name.clone()).or_default().push(release)
                        }
                        Err(error) => log::warn!(
                            "skipping release at {}: {error}",
                            release_dir.display()
                        ),
                    }
                }
            }
        }

        for releases in packages.values_mut() {
            releases.sort_by(|a, b| a.version.cmp(&b.version));
        }

        Ok(Self {
            root: Some(root),
            packages,
        })
    }

    /// The published releases of `name`, ascending by version.
    pub fn get(&self, name: &str) -> Result<&[Release], UnknownPackage> {
        self.packages
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| UnknownPackage(name.into()))
    }

    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.packages.keys()
    }

    /// The source directory of a release, when the cache is disk-backed.
    pub fn source_dir(
        &self,
        name: &str,
        version: &Version,
    ) -> Option<PathBuf> {
        let root = self.root.as_deref()?;
        Some(
            root.join(name)
                .join(version.to_string())
                .join(PACKAGE_SOURCE_DIR),
        )
    }
}

fn load_release(
    dir: &Path,
    version: Version,
) -> Result<Release, ManifestLoadError> {
    let manifest = Manifest::load(dir.join(MANIFEST_FILE))?;
    let dependencies = match manifest {
        Manifest::Package(package) => package.dependencies,
        // an application manifest inside the registry layout is nonsense,
        // but a release with no outgoing constraints is still usable
        Manifest::Application(_) => BTreeMap::new(),
    };

    Ok(Release {
        version,
        dependencies,
    })
}

fn read_subdirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut subdirs = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();

    subdirs.sort();
    Ok(subdirs)
}

fn dir_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|os_str| os_str.to_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_release(
        root: &Path,
        name: &str,
        version: &str,
        dependencies: &str,
    ) {
        let dir = root.join(name).join(version);
        fs::create_dir_all(dir.join(PACKAGE_SOURCE_DIR)).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                r#"{{
                    "type": "package",
                    "name": "{name}",
                    "version": "{version}",
                    "exposed-modules": [],
                    "elm-version": "0.19.0 <= v < 0.20.0",
                    "dependencies": {dependencies}
                }}"#
            ),
        )
        .unwrap();
    }

    #[test]
    fn scan_reads_the_registry_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write_release(root, "elm/core", "1.0.4", "{}");
        write_release(root, "elm/core", "1.0.5", "{}");
        write_release(
            root,
            "author/widgets",
            "2.0.0",
            r#"{ "elm/core": "1.0.0 <= v < 2.0.0" }"#,
        );
        // junk that must be skipped, not fatal
        fs::create_dir_all(root.join("elm/core/not-a-version")).unwrap();

        let cache = PackageCache::scan(root).unwrap();

        let core = cache.get("elm/core").unwrap();
        assert_eq!(core.len(), 2);
        assert!(core[0].version < core[1].version);

        let widgets = cache.get("author/widgets").unwrap();
        assert_eq!(widgets.len(), 1);
        assert!(widgets[0].dependencies.contains_key("elm/core"));

        assert!(matches!(
            cache.get("missing/package"),
            Err(UnknownPackage(name)) if name == "missing/package"
        ));

        let src = cache
            .source_dir("elm/core", &Version::new(1, 0, 5))
            .unwrap();
        assert!(src.ends_with("elm/core/1.0.5/src"));
    }

    #[test]
    fn from_releases_sorts_versions() {
        let cache = PackageCache::from_releases([(
            PackageName::from("a/b"),
            vec![
                Release {
                    version: Version::new(2, 0, 0),
                    dependencies: BTreeMap::new(),
                },
                Release {
                    version: Version::new(1, 0, 0),
                    dependencies: BTreeMap::new(),
                },
            ],
        )]);

        let releases = cache.get("a/b").unwrap();
        assert_eq!(releases[0].version, Version::new(1, 0, 0));
        assert_eq!(releases[1].version, Version::new(2, 0, 0));
    }
}
