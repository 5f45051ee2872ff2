//! Delegated-CLI backend: shells out to an authenticated `glab` binary.
//!
//! Reads go through `glab api`, which returns the same JSON as the REST API.
//! Mirror creation uses `glab repo mirror` with explicit flags, so no
//! credentials are ever handled here.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{
    encode_project_path, find_mirror, public_only, same_remote, ApiProject, ApiRemoteMirror,
    ApiUser, OriginClient,
};
use crate::error::MirrorError;
use crate::model::{MirrorConfig, MirrorOptions, OriginProject};

/// Result of running an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, if the process was not killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over process execution so the backend can run against fakes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capturing output. Errors only when the
    /// process cannot be started.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, MirrorError>;
}

/// Runs commands on the host
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, MirrorError> {
        let output = AsyncCommand::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MirrorError::transport(format!("failed to execute {}: {}", program, e)))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Origin client backed by the `glab` CLI
pub struct GlabClient<R = ProcessRunner> {
    runner: R,
    program: String,
    host: String,
    timeout: Duration,
}

impl<R: CommandRunner> GlabClient<R> {
    /// Create a client without checking authentication
    pub fn new(runner: R, program: &str, host: &str, timeout: Duration) -> Self {
        Self {
            runner,
            program: program.to_string(),
            host: host.to_string(),
            timeout,
        }
    }

    /// Create a client and verify that `glab` is installed and logged in to `host`.
    pub async fn connect(
        runner: R,
        program: &str,
        host: &str,
        timeout: Duration,
    ) -> Result<Self, MirrorError> {
        let client = Self::new(runner, program, host, timeout);
        client.verify_auth().await?;
        Ok(client)
    }

    async fn verify_auth(&self) -> Result<(), MirrorError> {
        debug!("Checking glab authentication for {}", self.host);

        let args = vec![
            "auth".to_string(),
            "status".to_string(),
            "--hostname".to_string(),
            self.host.clone(),
        ];
        match self.exec(args).await {
            Err(e) => Err(MirrorError::auth(format!(
                "glab CLI is not available at '{}': {}",
                self.program, e
            ))),
            Ok(output) if !output.is_success() => Err(MirrorError::auth(format!(
                "glab is not authenticated for {}. Run: glab auth login ({})",
                self.host,
                output.stderr.trim()
            ))),
            Ok(_) => Ok(()),
        }
    }

    async fn exec(&self, args: Vec<String>) -> Result<CommandOutput, MirrorError> {
        debug!("Running command: {} {}", self.program, args.join(" "));

        match timeout(self.timeout, self.runner.run(&self.program, &args)).await {
            Ok(result) => result,
            Err(_) => Err(MirrorError::transport(format!(
                "{} timed out after {}s",
                self.program,
                self.timeout.as_secs()
            ))),
        }
    }

    /// Run `glab api <endpoint>` and return stdout on success.
    async fn api(&self, endpoint: &str, paginate: bool) -> Result<String, MirrorError> {
        let mut args = vec![
            "api".to_string(),
            "--hostname".to_string(),
            self.host.clone(),
            endpoint.to_string(),
        ];
        if paginate {
            args.push("--paginate".to_string());
        }

        let output = self.exec(args).await?;
        if !output.is_success() {
            return Err(command_failure(&format!("glab api {}", endpoint), &output));
        }
        Ok(output.stdout)
    }

    async fn fetch_projects(&self, user: &str) -> Result<Vec<ApiProject>, MirrorError> {
        let endpoint = format!(
            "users/{}/projects?visibility=public&archived=false&per_page=100",
            user
        );
        let stdout = self.api(&endpoint, true).await?;
        parse_json_pages(&stdout)
    }

    fn mirror_args(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
        options: &MirrorOptions,
    ) -> Vec<String> {
        let mut args = vec![
            "repo".to_string(),
            "mirror".to_string(),
            project.web_url.clone(),
            "--url".to_string(),
            destination_clone_url.to_string(),
            "--direction".to_string(),
            options.direction.as_str().to_string(),
        ];
        if options.allow_divergence {
            args.push("--allow-divergence".to_string());
        }
        if options.protected_branches_only {
            args.push("--protected-branches-only".to_string());
        }
        if options.enabled {
            args.push("--enabled".to_string());
        }
        args
    }
}

/// Classify a failed invocation by the `(HTTP nnn)` suffix glab puts on API errors.
fn command_failure(what: &str, output: &CommandOutput) -> MirrorError {
    let stderr = output.stderr.trim();
    let message = format!("{} failed (exit {:?}): {}", what, output.code, stderr);
    if has_http_status(stderr, 401) || has_http_status(stderr, 403) {
        MirrorError::auth(message)
    } else {
        MirrorError::transport(message)
    }
}

fn has_http_status(stderr: &str, status: u16) -> bool {
    stderr.contains(&format!("(HTTP {})", status))
}

fn is_not_found(output: &CommandOutput) -> bool {
    has_http_status(&output.stderr, 404)
}

/// `glab api --paginate` prints one JSON array per page back to back.
fn parse_json_pages<T: DeserializeOwned>(stdout: &str) -> Result<Vec<T>, MirrorError> {
    let mut items = Vec::new();
    for page in serde_json::Deserializer::from_str(stdout).into_iter::<Vec<T>>() {
        items.extend(page?);
    }
    Ok(items)
}

/// Interpret `glab repo mirror` output.
///
/// JSON is used as-is. Otherwise glab's confirmation line is expected:
///
/// ```text
/// ✓ Created Push Mirror for https://github.com/bob/tool.git (17) on GitLab at alice/tool (42)
/// ✓ Created Pull Mirror for https://github.com/bob/tool.git on GitLab at alice/tool (42)
/// ```
///
/// Push mirrors carry their id after the URL; pull mirrors have none.
fn parse_mirror_output(
    stdout: &str,
    url: &str,
    options: &MirrorOptions,
) -> Result<MirrorConfig, MirrorError> {
    let stdout = stdout.trim();
    if let Ok(mirror) = serde_json::from_str::<ApiRemoteMirror>(stdout) {
        return Ok(MirrorConfig::from(mirror));
    }

    let confirmation = stdout
        .split_once("Created ")
        .and_then(|(_, rest)| rest.split_once(" Mirror for "))
        .map(|(_, described)| described);
    let Some(described) = confirmation else {
        return Err(MirrorError::transport(format!(
            "unrecognised output from glab repo mirror: {:?}",
            stdout
        )));
    };

    let mut words = described.split_whitespace();
    let reported = words.next().unwrap_or_default();
    if !same_remote(reported, url) {
        return Err(MirrorError::transport(format!(
            "glab repo mirror reported target {} instead of {}",
            reported, url
        )));
    }
    let id = words
        .next()
        .and_then(|word| word.strip_prefix('('))
        .and_then(|word| word.strip_suffix(')'))
        .and_then(|word| word.parse().ok());

    Ok(MirrorConfig {
        id,
        url: url.to_string(),
        enabled: options.enabled,
        only_protected_branches: options.protected_branches_only,
        keep_divergent_refs: options.allow_divergence,
    })
}

#[async_trait]
impl<R: CommandRunner> OriginClient for GlabClient<R> {
    fn backend_name(&self) -> &'static str {
        "glab CLI"
    }

    async fn current_user(&self) -> Result<String, MirrorError> {
        let stdout = self.api("user", false).await?;
        let user: ApiUser = serde_json::from_str(&stdout)?;
        Ok(user.username)
    }

    fn list_public_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<OriginProject, MirrorError>> {
        let projects = stream::once(self.fetch_projects(user))
            .map_ok(|projects| {
                stream::iter(projects.into_iter().map(|p| Ok(OriginProject::from(p))))
            })
            .try_flatten()
            .boxed();

        public_only(projects)
    }

    async fn find_public_project(&self, path: &str) -> Result<Option<OriginProject>, MirrorError> {
        let endpoint = format!("projects/{}", encode_project_path(path));
        let args = vec![
            "api".to_string(),
            "--hostname".to_string(),
            self.host.clone(),
            endpoint.clone(),
        ];

        let output = self.exec(args).await?;
        if !output.is_success() {
            if is_not_found(&output) {
                return Ok(None);
            }
            return Err(command_failure(&format!("glab api {}", endpoint), &output));
        }

        let project = OriginProject::from(serde_json::from_str::<ApiProject>(&output.stdout)?);
        Ok(project.is_public().then_some(project))
    }

    async fn get_mirror_config(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
    ) -> Result<Option<MirrorConfig>, MirrorError> {
        let stdout = self
            .api(&format!("projects/{}/remote_mirrors", project.id), false)
            .await?;
        let mirrors: Vec<ApiRemoteMirror> = parse_json_pages(&stdout)?;
        debug!("Found {} push mirrors on {}", mirrors.len(), project.repo);
        if let Some(mirror) = find_mirror(mirrors, destination_clone_url) {
            return Ok(Some(mirror));
        }

        // pull mirrors are not listed there; they live on the project itself
        let stdout = self.api(&format!("projects/{}", project.id), false).await?;
        let details: ApiProject = serde_json::from_str(&stdout)?;
        Ok(details
            .pull_mirror()
            .filter(|mirror| same_remote(&mirror.url, destination_clone_url)))
    }

    async fn create_mirror_config(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
        options: &MirrorOptions,
    ) -> Result<MirrorConfig, MirrorError> {
        info!("Creating mirror for {} -> {} via glab", project.repo, destination_clone_url);

        let output = self
            .exec(self.mirror_args(project, destination_clone_url, options))
            .await?;
        if !output.is_success() {
            return Err(command_failure("glab repo mirror", &output));
        }

        parse_mirror_output(&output.stdout, destination_clone_url, options)
    }
}
