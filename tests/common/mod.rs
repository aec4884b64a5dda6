//! Shared test utilities for integration and E2E tests.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = ManifestFixture::new().with_diamond();
//! let mut cmd = cargo_bin_cmd!("complink");
//! cmd.arg("order").arg("--manifests").arg(fixture.path());
//! ```

use assert_fs::prelude::*;
use std::path::Path;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::manifests;
    pub use super::ManifestFixture;
}

/// Manifest JSON snippets for testing.
#[allow(dead_code)]
pub mod manifests {
    pub const APP: &str =
        r#"{ "id": "App", "dependencies": [ { "id": "LibMath1" }, { "id": "LibStats" } ] }"#;

    /// Exports `log_base10` at 1.0.0 and 2.0.0.
    pub const LIB_CORE: &str = r#"{
        "id": "LibCore",
        "version": "2.0.0",
        "exported_symbols": [
            { "name": "log_base10", "version": "1.0.0" },
            { "name": "log_base10", "version": "2.0.0", "type": "function" }
        ]
    }"#;

    pub const LIB_MATH1: &str =
        r#"{ "id": "LibMath1", "dependencies": [ { "id": "LibCore", "version_req": "^1.0.0" } ] }"#;

    pub const LIB_STATS: &str =
        r#"{ "id": "LibStats", "dependencies": [ { "id": "LibCore", "version": "^2.0.0" } ] }"#;

    pub const CYCLE_A: &str = r#"{ "id": "A", "dependencies": [ { "id": "B" } ] }"#;
    pub const CYCLE_B: &str = r#"{ "id": "B", "dependencies": [ { "id": "C" } ] }"#;
    pub const CYCLE_C: &str = r#"{ "id": "C", "dependencies": [ { "id": "A" } ] }"#;

    /// Requires a component that is never declared.
    pub const NEEDS_Z: &str = r#"{ "id": "D", "dependencies": [ { "id": "Z" } ] }"#;

    pub const INVALID_VERSION: &str = r#"{ "id": "Broken", "version": "1.x" }"#;
}

/// A temporary directory populated with component manifests.
pub struct ManifestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl ManifestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a manifest file with the given content.
    pub fn with_manifest(self, name: &str, content: &str) -> Self {
        self.temp_dir
            .child(name)
            .write_str(content)
            .expect("Failed to write manifest");
        self
    }

    /// The LibCore/LibMath1/LibStats/App diamond.
    pub fn with_diamond(self) -> Self {
        self.with_manifest("app.json", manifests::APP)
            .with_manifest("libcore.json", manifests::LIB_CORE)
            .with_manifest("libmath1.json", manifests::LIB_MATH1)
            .with_manifest("libstats.json", manifests::LIB_STATS)
    }

    pub fn with_cycle(self) -> Self {
        self.with_manifest("a.json", manifests::CYCLE_A)
            .with_manifest("b.json", manifests::CYCLE_B)
            .with_manifest("c.json", manifests::CYCLE_C)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}
