//! Packages: version constraints, manifests, the on-disk registry cache,
//! and the dependency solver.

use ecow::EcoString;

pub mod cache;
pub mod constraint;
pub mod metadata;
pub mod solver;

/// The manifest file at the root of every Elm project and package release.
pub const MANIFEST_FILE: &str = "elm.json";

/// The directory holding a release's modules, relative to its root.
pub const PACKAGE_SOURCE_DIR: &str = "src";

/// A dotted package name of the form `author/name`.
pub type PackageName = EcoString;
