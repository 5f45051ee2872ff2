//! Token backend: talks to the GitLab REST API directly.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    encode_project_path, embed_credentials, find_mirror, public_only, ApiProject,
    ApiRemoteMirror, ApiUser, OriginClient,
};
use crate::error::MirrorError;
use crate::model::{MirrorConfig, MirrorDirection, MirrorOptions, OriginProject};

const PER_PAGE: u32 = 100;

/// Destination login and token embedded into push mirror URLs
#[derive(Clone)]
pub struct PushCredential {
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for PushCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushCredential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /projects/:id/remote_mirrors`
#[derive(Debug, Serialize)]
struct CreateRemoteMirror<'a> {
    url: &'a str,
    enabled: bool,
    only_protected_branches: bool,
    keep_divergent_refs: bool,
}

/// GitLab API client authenticated with a personal access token
pub struct GitLabClient {
    http: Client,
    api_base: String,
    token: String,
    push_credential: PushCredential,
}

impl GitLabClient {
    /// Create a client for `host` ("gitlab.com" or "https://gitlab.example.com").
    ///
    /// Fails with [`MirrorError::Auth`] up front when either token is missing.
    pub fn new(
        host: &str,
        token: &str,
        push_credential: PushCredential,
        timeout: Duration,
    ) -> Result<Self, MirrorError> {
        if token.trim().is_empty() {
            return Err(MirrorError::auth("no GitLab token configured"));
        }
        if push_credential.token.trim().is_empty() {
            return Err(MirrorError::auth(
                "no GitHub token available to embed in mirror URLs",
            ));
        }

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mirrormaker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: Self::api_base_for(host),
            token: token.to_string(),
            push_credential,
        })
    }

    /// REST base URL for a host, defaulting to HTTPS.
    pub fn api_base_for(host: &str) -> String {
        let host = host.trim().trim_end_matches('/');
        if host.contains("://") {
            format!("{}/api/v4", host)
        } else {
            format!("https://{}/api/v4", host)
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(&self.token)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, MirrorError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::from_status(status.as_u16(), &body));
        }
        Ok(response.json::<T>().await?)
    }

    /// Fetch one page of a user's public projects and the next page number, if any.
    async fn fetch_project_page(
        &self,
        user: &str,
        page: u32,
    ) -> Result<(Vec<ApiProject>, Option<u32>), MirrorError> {
        debug!("Fetching GitLab projects for {} page {}", user, page);

        let response = self
            .request(Method::GET, &format!("/users/{}/projects", user))
            .query(&[
                ("visibility", "public".to_string()),
                ("archived", "false".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::from_status(status.as_u16(), &body));
        }

        let next_page = response
            .headers()
            .get("x-next-page")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u32>().ok());

        let projects = response.json::<Vec<ApiProject>>().await?;
        Ok((projects, next_page))
    }

    async fn list_remote_mirrors(&self, project_id: u64) -> Result<Vec<ApiRemoteMirror>, MirrorError> {
        Self::send_json(self.request(
            Method::GET,
            &format!("/projects/{}/remote_mirrors", project_id),
        ))
        .await
    }
}

#[async_trait]
impl OriginClient for GitLabClient {
    fn backend_name(&self) -> &'static str {
        "GitLab API"
    }

    async fn current_user(&self) -> Result<String, MirrorError> {
        let user: ApiUser = Self::send_json(self.request(Method::GET, "/user")).await?;
        Ok(user.username)
    }

    fn list_public_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<OriginProject, MirrorError>> {
        let pages = stream::try_unfold(Some(1u32), move |page| async move {
            let Some(page) = page else {
                return Ok::<_, MirrorError>(None);
            };
            let (projects, next_page) = self.fetch_project_page(user, page).await?;
            Ok(Some((projects, next_page)))
        });

        let projects = pages
            .map_ok(|projects| {
                stream::iter(projects.into_iter().map(|p| Ok(OriginProject::from(p))))
            })
            .try_flatten()
            .boxed();

        public_only(projects)
    }

    async fn find_public_project(&self, path: &str) -> Result<Option<OriginProject>, MirrorError> {
        debug!("Fetching GitLab project: {}", path);

        let response = self
            .request(Method::GET, &format!("/projects/{}", encode_project_path(path)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::from_status(status.as_u16(), &body));
        }

        let project = OriginProject::from(response.json::<ApiProject>().await?);
        if !project.is_public() {
            debug!("Project {} is not public", project.repo);
            return Ok(None);
        }
        Ok(Some(project))
    }

    async fn get_mirror_config(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
    ) -> Result<Option<MirrorConfig>, MirrorError> {
        let mirrors = self.list_remote_mirrors(project.id).await?;
        debug!("Found {} mirrors on {}", mirrors.len(), project.repo);
        Ok(find_mirror(mirrors, destination_clone_url))
    }

    async fn create_mirror_config(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
        options: &MirrorOptions,
    ) -> Result<MirrorConfig, MirrorError> {
        if options.direction == MirrorDirection::Pull {
            return Err(MirrorError::transport(
                "the GitLab remote mirror API only supports push mirrors",
            ));
        }

        let url = embed_credentials(
            destination_clone_url,
            &self.push_credential.username,
            &self.push_credential.token,
        )?;
        let body = CreateRemoteMirror {
            url: &url,
            enabled: options.enabled,
            only_protected_branches: options.protected_branches_only,
            keep_divergent_refs: options.allow_divergence,
        };

        info!("Creating mirror for {} -> {}", project.repo, destination_clone_url);

        let created: ApiRemoteMirror = Self::send_json(
            self.request(Method::POST, &format!("/projects/{}/remote_mirrors", project.id))
                .json(&body),
        )
        .await?;

        Ok(MirrorConfig::from(created))
    }
}
