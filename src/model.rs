//! Value types shared by the clients, the matcher and the reconciler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a repository on either host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    /// Owner login or group path
    pub namespace: String,
    pub name: String,
    /// `namespace/name`
    pub full_path: String,
}

impl RepositoryRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        let full_path = format!("{}/{}", namespace, name);
        Self {
            namespace,
            name,
            full_path,
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path)
    }
}

/// Origin project visibility. Anything other than `public` is treated alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    NonPublic,
}

impl Visibility {
    /// Map the API's visibility level; a missing level is never public.
    pub fn from_api(level: Option<&str>) -> Self {
        match level {
            Some("public") => Visibility::Public,
            _ => Visibility::NonPublic,
        }
    }
}

/// A project on the origin host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginProject {
    pub repo: RepositoryRef,
    /// Numeric project id used by the remote mirror endpoints
    pub id: u64,
    pub description: Option<String>,
    /// Canonical browsing URL
    pub web_url: String,
    pub visibility: Visibility,
}

impl OriginProject {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// A repository on the destination host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRepo {
    pub repo: RepositoryRef,
    pub description: Option<String>,
    pub homepage: Option<String>,
    /// HTTPS clone URL without credentials
    pub clone_url: String,
}

/// Which way a mirror moves commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorDirection {
    #[default]
    Push,
    Pull,
}

impl MirrorDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorDirection::Push => "push",
            MirrorDirection::Pull => "pull",
        }
    }
}

/// Options applied to every mirror created during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorOptions {
    #[serde(default)]
    pub direction: MirrorDirection,

    /// Divergent refs on the destination are not rejected
    #[serde(default)]
    pub allow_divergence: bool,

    #[serde(default)]
    pub protected_branches_only: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            direction: MirrorDirection::Push,
            allow_divergence: false,
            protected_branches_only: false,
            enabled: default_true(),
        }
    }
}

/// An origin-side remote mirror pointing at a destination URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub id: Option<u64>,
    /// Remote URL as reported by the origin, credentials possibly masked
    pub url: String,
    pub enabled: bool,
    pub only_protected_branches: bool,
    pub keep_divergent_refs: bool,
}
