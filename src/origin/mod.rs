//! Origin host (GitLab) access
//!
//! [`OriginClient`] is the capability contract the reconciler depends on. Two
//! backends implement it:
//!
//! - [`GitLabClient`]: token-authenticated REST calls
//! - [`GlabClient`]: delegates to an already-authenticated `glab` CLI
//!
//! Both parse the same GitLab JSON shapes defined here, so projects and
//! mirrors look identical regardless of which backend fetched them.

pub mod gitlab;
pub mod glab;

use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;

use crate::error::MirrorError;
use crate::model::{MirrorConfig, MirrorOptions, OriginProject, RepositoryRef, Visibility};

pub use gitlab::GitLabClient;
pub use glab::{CommandOutput, CommandRunner, GlabClient, ProcessRunner};

/// Default origin host
pub const DEFAULT_HOST: &str = "gitlab.com";

/// Capability contract shared by the token and CLI backends
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Backend name for display/logging
    fn backend_name(&self) -> &'static str;

    /// Login of the authenticated user
    async fn current_user(&self) -> Result<String, MirrorError>;

    /// Public projects in `user`'s namespace, across all pages.
    ///
    /// Non-public items are dropped even if the host returns them.
    fn list_public_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<OriginProject, MirrorError>>;

    /// Resolve `namespace/project`. `None` when it does not exist or is not public.
    async fn find_public_project(&self, path: &str) -> Result<Option<OriginProject>, MirrorError>;

    /// Existing mirror of `project` whose remote equals `destination_clone_url`
    /// once credentials are stripped from both sides.
    async fn get_mirror_config(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
    ) -> Result<Option<MirrorConfig>, MirrorError>;

    /// Always attempts creation; callers check [`OriginClient::get_mirror_config`] first.
    async fn create_mirror_config(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
        options: &MirrorOptions,
    ) -> Result<MirrorConfig, MirrorError>;
}

/// Project as returned by `GET /projects`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiProject {
    pub id: u64,
    pub path: String,
    pub path_with_namespace: String,
    pub description: Option<String>,
    pub web_url: String,
    pub visibility: Option<String>,
    #[serde(default)]
    pub mirror: bool,
    pub import_url: Option<String>,
    pub only_mirror_protected_branches: Option<bool>,
    pub mirror_overwrites_diverged_branches: Option<bool>,
}

impl ApiProject {
    /// Pull mirror configured on the project itself. Plain imports are not mirrors.
    pub(crate) fn pull_mirror(&self) -> Option<MirrorConfig> {
        if !self.mirror {
            return None;
        }
        let url = self.import_url.as_ref()?;
        Some(MirrorConfig {
            id: None,
            url: url.clone(),
            enabled: true,
            only_protected_branches: self.only_mirror_protected_branches.unwrap_or(false),
            keep_divergent_refs: self.mirror_overwrites_diverged_branches == Some(false),
        })
    }
}

impl From<ApiProject> for OriginProject {
    fn from(project: ApiProject) -> Self {
        let namespace = project
            .path_with_namespace
            .rsplit_once('/')
            .map(|(namespace, _)| namespace.to_string())
            .unwrap_or_default();

        OriginProject {
            repo: RepositoryRef::new(namespace, project.path),
            id: project.id,
            description: project.description,
            web_url: project.web_url,
            visibility: Visibility::from_api(project.visibility.as_deref()),
        }
    }
}

/// Remote mirror as returned by `GET /projects/:id/remote_mirrors`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiRemoteMirror {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub only_protected_branches: bool,
    #[serde(default)]
    pub keep_divergent_refs: bool,
}

impl From<ApiRemoteMirror> for MirrorConfig {
    fn from(mirror: ApiRemoteMirror) -> Self {
        MirrorConfig {
            id: Some(mirror.id),
            url: mirror.url,
            enabled: mirror.enabled,
            only_protected_branches: mirror.only_protected_branches,
            keep_divergent_refs: mirror.keep_divergent_refs,
        }
    }
}

/// Current user as returned by `GET /user`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiUser {
    pub username: String,
}

/// Drop anything that is not public.
pub fn public_only<'a>(
    projects: BoxStream<'a, Result<OriginProject, MirrorError>>,
) -> BoxStream<'a, Result<OriginProject, MirrorError>> {
    projects
        .filter(|item| {
            let keep = match item {
                Ok(project) if !project.is_public() => {
                    tracing::debug!("Dropping non-public project: {}", project.repo);
                    false
                }
                _ => true,
            };
            future::ready(keep)
        })
        .boxed()
}

/// Remove any `user:password@` section from a URL's authority.
pub fn strip_credentials(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);
    match authority.rfind('@') {
        Some(at) => format!("{}://{}{}", scheme, &authority[at + 1..], path),
        None => url.to_string(),
    }
}

/// Insert `username:token@` into an HTTPS URL, replacing any existing credentials.
pub fn embed_credentials(url: &str, username: &str, token: &str) -> Result<String, MirrorError> {
    let clean = strip_credentials(url);
    let (scheme, rest) = clean
        .split_once("://")
        .ok_or_else(|| MirrorError::transport(format!("not an absolute URL: {}", clean)))?;
    Ok(format!("{}://{}:{}@{}", scheme, username, token, rest))
}

/// Whether two remote URLs name the same target, ignoring credentials.
pub fn same_remote(a: &str, b: &str) -> bool {
    strip_credentials(a) == strip_credentials(b)
}

/// First mirror that targets `destination_clone_url`.
pub(crate) fn find_mirror(
    mirrors: Vec<ApiRemoteMirror>,
    destination_clone_url: &str,
) -> Option<MirrorConfig> {
    mirrors
        .into_iter()
        .find(|mirror| same_remote(&mirror.url, destination_clone_url))
        .map(MirrorConfig::from)
}

/// URL-encode a `namespace/project` path for use as a GitLab project id.
pub(crate) fn encode_project_path(path: &str) -> String {
    path.replace('/', "%2F")
}
