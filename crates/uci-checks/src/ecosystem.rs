//! Dependency ecosystems the vulnerability check knows how to probe.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Ecosystem {
    /// Go modules (`go.sum`)
    GoModules,

    /// PHP Composer (`composer.lock`)
    PhpComposer,

    /// Node.js npm (`package.json`)
    NodeNpm,
}

impl Ecosystem {
    /// Probe order.
    pub const ALL: [Ecosystem; 3] = [
        Ecosystem::GoModules,
        Ecosystem::PhpComposer,
        Ecosystem::NodeNpm,
    ];

    /// Manifest filename at the root of a working copy.
    pub fn manifest(&self) -> &'static str {
        match self {
            Ecosystem::GoModules => "go.sum",
            Ecosystem::PhpComposer => "composer.lock",
            Ecosystem::NodeNpm => "package.json",
        }
    }

    /// Tag the scanner service uses for this ecosystem.
    pub fn tag(&self) -> &'static str {
        match self {
            Ecosystem::GoModules => "golang",
            Ecosystem::PhpComposer => "php",
            Ecosystem::NodeNpm => "nodejs",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifests_and_tags() {
        assert_eq!(Ecosystem::GoModules.manifest(), "go.sum");
        assert_eq!(Ecosystem::PhpComposer.manifest(), "composer.lock");
        assert_eq!(Ecosystem::NodeNpm.manifest(), "package.json");
        assert_eq!(Ecosystem::PhpComposer.tag(), "php");
        assert_eq!(Ecosystem::NodeNpm.to_string(), "nodejs");
    }

    #[test]
    fn test_probe_order() {
        assert_eq!(
            Ecosystem::ALL,
            [
                Ecosystem::GoModules,
                Ecosystem::PhpComposer,
                Ecosystem::NodeNpm
            ]
        );
    }
}
