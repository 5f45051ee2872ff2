use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::env;
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::DestinationConfig;
use crate::error::MirrorError;
use crate::model::{DestinationRepo, RepositoryRef};
use crate::origin::gitlab::PushCredential;

/// Suffix appended to the description of every repository created as a mirror
pub const MIRROR_SUFFIX: &str = "[mirror]";

const PER_PAGE: u8 = 100;

/// Destination-side operations the reconciler needs
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Namespace new repositories are created in
    fn user(&self) -> &str;

    /// Credential-free HTTPS clone URL of `user/name`
    fn clone_url(&self, name: &str) -> String;

    /// Repositories owned by `user`, across all pages
    fn list_owned_repos<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<DestinationRepo, MirrorError>>;

    /// Create a public repository. Fails with [`MirrorError::Conflict`] when the
    /// name is already taken.
    async fn create_repo(
        &self,
        name: &str,
        description: &str,
        homepage: &str,
    ) -> Result<DestinationRepo, MirrorError>;
}

/// Description for a newly created mirror repository
pub fn mirror_description(description: Option<&str>) -> String {
    match description {
        Some(description) if !description.is_empty() => {
            format!("{} {}", description, MIRROR_SUFFIX)
        }
        _ => MIRROR_SUFFIX.to_string(),
    }
}

/// GitHub authentication strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Token from the configuration file or command line
    ConfiguredToken,
    /// Use GitHub CLI authentication
    GitHubCLI,
    /// Use environment variable token
    EnvironmentToken,
}

/// Repository as returned by the GitHub REST API
#[derive(Debug, Clone, Deserialize)]
struct ApiRepository {
    name: String,
    owner: ApiOwner,
    description: Option<String>,
    homepage: Option<String>,
    clone_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiOwner {
    login: String,
}

/// Body of `POST /user/repos`
#[derive(Debug, Serialize)]
struct CreateRepository<'a> {
    name: &'a str,
    description: &'a str,
    homepage: &'a str,
    private: bool,
    has_wiki: bool,
    has_projects: bool,
}

#[derive(Debug, Serialize)]
struct ListParams {
    affiliation: &'static str,
    per_page: u8,
    page: u8,
}

/// GitHub client wrapper with authentication management
#[derive(Clone)]
pub struct GitHubClient {
    client: Octocrab,
    username: String,
    token: String,
    web_base: String,
}

impl GitHubClient {
    /// Create a new GitHub client, resolving the token per `auth_method`
    pub async fn new(config: &DestinationConfig) -> Result<Self> {
        let (auth_strategy, token) = Self::detect_authentication(config)?;

        info!("Using GitHub authentication strategy: {:?}", auth_strategy);

        let mut builder = Octocrab::builder();
        if let Some(api_url) = &config.api_url {
            builder = builder
                .base_uri(api_url.as_str())
                .with_context(|| format!("Invalid GitHub API URL: {}", api_url))?;
        }
        let client = builder
            .personal_token(token.clone())
            .build()
            .context("Failed to create GitHub client")?;

        // Get authenticated user information
        let user = client
            .current()
            .user()
            .await
            .map_err(classify_octocrab_error)
            .context("Failed to get current GitHub user. Check your authentication.")?;

        let username = config.user.clone().unwrap_or_else(|| user.login.clone());
        if !username.eq_ignore_ascii_case(&user.login) {
            warn!(
                "Configured GitHub user {} differs from authenticated user {}; repositories are created under the authenticated account",
                username, user.login
            );
        }

        info!("Authenticated as GitHub user: {}", user.login);

        Ok(Self::with_client(client, username, token, "https://github.com"))
    }

    /// Create from an existing octocrab instance
    pub fn with_client(client: Octocrab, username: String, token: String, web_base: &str) -> Self {
        Self {
            client,
            username,
            token,
            web_base: web_base.trim_end_matches('/').to_string(),
        }
    }

    /// Detect and obtain GitHub authentication
    fn detect_authentication(config: &DestinationConfig) -> Result<(AuthStrategy, String)> {
        let configured = config
            .token
            .as_ref()
            .filter(|token| !token.trim().is_empty())
            .cloned();

        match config.auth_method.as_str() {
            "auto" => {
                // Explicit token first, then environment, then GitHub CLI
                if let Some(token) = configured {
                    Ok((AuthStrategy::ConfiguredToken, token))
                } else if let Ok(token) = Self::try_environment_token() {
                    Ok((AuthStrategy::EnvironmentToken, token))
                } else if let Ok(token) = Self::try_github_cli() {
                    Ok((AuthStrategy::GitHubCLI, token))
                } else {
                    Err(anyhow!(MirrorError::auth(
                        "No GitHub authentication found. Please either:\n\
                         1. Pass --github-token or set MIRRORMAKER_GITHUB_TOKEN\n\
                         2. Set GITHUB_TOKEN environment variable\n\
                         3. Install and authenticate GitHub CLI: gh auth login"
                    )))
                }
            }
            "gh_cli" => {
                let token = Self::try_github_cli()
                    .context("GitHub CLI authentication failed. Run: gh auth login")?;
                Ok((AuthStrategy::GitHubCLI, token))
            }
            "token" => match configured {
                Some(token) => Ok((AuthStrategy::ConfiguredToken, token)),
                None => {
                    let token = Self::try_environment_token()
                        .context("No GitHub token configured and GITHUB_TOKEN is not set")?;
                    Ok((AuthStrategy::EnvironmentToken, token))
                }
            },
            other => Err(anyhow!("Unknown auth method: {}", other)),
        }
    }

    /// Try to get token from GitHub CLI
    fn try_github_cli() -> Result<String> {
        debug!("Attempting GitHub CLI authentication");

        let token_output = Command::new("gh")
            .args(["auth", "token"])
            .output()
            .context("GitHub CLI (gh) is not installed")?;

        if !token_output.status.success() {
            return Err(anyhow!(
                "Failed to retrieve token from GitHub CLI: {}",
                String::from_utf8_lossy(&token_output.stderr)
            ));
        }

        let token = String::from_utf8(token_output.stdout)
            .context("GitHub CLI token is not valid UTF-8")?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(anyhow!("GitHub CLI returned empty token"));
        }

        debug!("Successfully obtained token from GitHub CLI");
        Ok(token)
    }

    /// Try to get token from environment variable
    fn try_environment_token() -> Result<String> {
        debug!("Attempting environment variable authentication");

        let token =
            env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable not set")?;

        if token.is_empty() {
            return Err(anyhow!("GITHUB_TOKEN is empty"));
        }

        Ok(token)
    }

    /// Get the destination username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Credential the token backend embeds into push mirror URLs
    pub fn push_credential(&self) -> PushCredential {
        PushCredential {
            username: self.username.clone(),
            token: self.token.clone(),
        }
    }

    fn to_destination(&self, repo: ApiRepository) -> DestinationRepo {
        let clone_url = repo
            .clone_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}/{}.git", self.web_base, repo.owner.login, repo.name));

        DestinationRepo {
            repo: RepositoryRef::new(repo.owner.login, repo.name),
            description: repo.description,
            homepage: repo.homepage,
            clone_url,
        }
    }

    async fn fetch_page(&self, page: u8) -> Result<Vec<ApiRepository>, MirrorError> {
        debug!("Fetching GitHub repositories page {}", page);

        let params = ListParams {
            affiliation: "owner",
            per_page: PER_PAGE,
            page,
        };
        self.client
            .get("/user/repos", Some(&params))
            .await
            .map_err(classify_octocrab_error)
    }
}

/// Map octocrab failures onto the shared error taxonomy.
fn classify_octocrab_error(err: octocrab::Error) -> MirrorError {
    match &err {
        octocrab::Error::GitHub { source, .. } => {
            let status = source.status_code.as_u16();
            match status {
                401 | 403 => MirrorError::auth(source.message.clone()),
                409 | 422 => MirrorError::conflict(source.message.clone()),
                _ => MirrorError::transport(format!("HTTP {}: {}", status, source.message)),
            }
        }
        _ => MirrorError::transport(err.to_string()),
    }
}

#[async_trait]
impl DestinationClient for GitHubClient {
    fn user(&self) -> &str {
        &self.username
    }

    fn clone_url(&self, name: &str) -> String {
        format!("{}/{}/{}.git", self.web_base, self.username, name)
    }

    fn list_owned_repos<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<DestinationRepo, MirrorError>> {
        let pages = stream::try_unfold(Some(1u8), move |page| async move {
            let Some(page) = page else {
                return Ok::<_, MirrorError>(None);
            };
            let items = self.fetch_page(page).await?;
            let next = if items.len() < PER_PAGE as usize {
                None
            } else if page == u8::MAX {
                // GitHub API pagination limit for u8
                warn!("Reached maximum pagination limit (255 pages)");
                None
            } else {
                Some(page + 1)
            };
            Ok(Some((items, next)))
        });

        pages
            .map_ok(move |items| {
                let repos: Vec<Result<DestinationRepo, MirrorError>> = items
                    .into_iter()
                    .filter(|repo| repo.owner.login.eq_ignore_ascii_case(user))
                    .map(|repo| Ok(self.to_destination(repo)))
                    .collect();
                stream::iter(repos)
            })
            .try_flatten()
            .boxed()
    }

    async fn create_repo(
        &self,
        name: &str,
        description: &str,
        homepage: &str,
    ) -> Result<DestinationRepo, MirrorError> {
        info!("Creating GitHub repository: {}", name);

        let body = CreateRepository {
            name,
            description,
            homepage,
            private: false,
            has_wiki: false,
            has_projects: false,
        };
        let created: ApiRepository = self
            .client
            .post("/user/repos", Some(&body))
            .await
            .map_err(classify_octocrab_error)?;

        info!("GitHub repository created: {}", name);
        Ok(self.to_destination(created))
    }
}
