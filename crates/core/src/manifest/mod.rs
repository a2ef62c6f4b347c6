//! Script manifests: the per-script descriptor pair found on disk.
//!
//! Every immediate subdirectory of the scripts root holds a
//! [`PACKAGE_FILE`] (name, description, entry point) and a
//! [`SCRIPT_FILE`] (arguments, lock file flag, monitoring override).
//! [`loader::load_manifests`] merges each pair into a [`ScriptManifest`].

pub mod loader;
pub mod types;

pub use loader::{load_manifest, load_manifests, ManifestError};
pub use types::{ArgumentSpec, PackageDescriptor, ScriptDescriptor, ScriptManifest};

/// Package descriptor file name inside a script directory.
pub const PACKAGE_FILE: &str = "package.json";

/// Script configuration file name inside a script directory.
pub const SCRIPT_FILE: &str = "script.json";
