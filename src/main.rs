use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mirrormaker::config::OriginBackend;
use mirrormaker::origin::ProcessRunner;
use mirrormaker::{
    Config, GitHubClient, GitLabClient, GlabClient, MirrorDirection, OriginClient, OriginProject,
    ReconcileOptions, Reconciler,
};

#[derive(Parser)]
#[command(name = "mirrormaker")]
#[command(about = "Set up GitHub push mirrors for public GitLab repositories")]
#[command(version)]
struct Cli {
    /// Only mirror this project: "project" (in your namespace) or "namespace/project"
    repo: Option<String>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, env = "MIRRORMAKER_CONFIG")]
    config: Option<PathBuf>,

    /// GitLab host, e.g. gitlab.com or https://gitlab.example.com
    #[arg(long, env = "MIRRORMAKER_GITLAB_HOST")]
    gitlab_host: Option<String>,

    /// GitLab personal access token
    #[arg(long, env = "MIRRORMAKER_GITLAB_TOKEN", hide_env_values = true)]
    gitlab_token: Option<String>,

    /// GitHub personal access token
    #[arg(long, env = "MIRRORMAKER_GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// GitHub user that owns the mirrors (defaults to the authenticated user)
    #[arg(long, env = "MIRRORMAKER_GITHUB_USER")]
    github_user: Option<String>,

    /// Print what would be done without creating anything
    #[arg(long, env = "MIRRORMAKER_DRY_RUN", overrides_with = "no_dry_run")]
    dry_run: bool,

    #[arg(long, overrides_with = "dry_run", hide = true)]
    no_dry_run: bool,

    /// Use the glab CLI instead of a GitLab token
    #[arg(long, env = "MIRRORMAKER_USE_GLAB", overrides_with = "no_use_glab")]
    use_glab: bool,

    #[arg(long, overrides_with = "use_glab", hide = true)]
    no_use_glab: bool,

    /// Path to the glab executable
    #[arg(long, env = "MIRRORMAKER_GLAB_PATH")]
    glab_path: Option<String>,

    /// Mirror direction
    #[arg(long, value_enum, env = "MIRRORMAKER_MIRROR_DIRECTION")]
    mirror_direction: Option<DirectionArg>,

    /// Do not reject divergent refs on GitHub
    #[arg(
        long,
        env = "MIRRORMAKER_ALLOW_DIVERGENCE",
        overrides_with = "no_allow_divergence"
    )]
    allow_divergence: bool,

    #[arg(long, overrides_with = "allow_divergence", hide = true)]
    no_allow_divergence: bool,

    /// Mirror protected branches only
    #[arg(
        long,
        env = "MIRRORMAKER_PROTECTED_BRANCHES_ONLY",
        overrides_with = "no_protected_branches_only"
    )]
    protected_branches_only: bool,

    #[arg(long, overrides_with = "protected_branches_only", hide = true)]
    no_protected_branches_only: bool,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum DirectionArg {
    Push,
    Pull,
}

impl From<DirectionArg> for MirrorDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Push => MirrorDirection::Push,
            DirectionArg::Pull => MirrorDirection::Pull,
        }
    }
}

/// Resolve a `--flag` / `--no-flag` pair; `None` when neither was given
fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

impl Cli {
    /// Layer command line and environment values over the loaded file
    fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.gitlab_host {
            config.origin.host = host.clone();
        }
        if let Some(token) = &self.gitlab_token {
            config.origin.token = Some(token.clone());
        }
        if let Some(token) = &self.github_token {
            config.destination.token = Some(token.clone());
        }
        if let Some(user) = &self.github_user {
            config.destination.user = Some(user.clone());
        }
        if let Some(dry_run) = flag_pair(self.dry_run, self.no_dry_run) {
            config.dry_run = dry_run;
        }
        if let Some(use_glab) = flag_pair(self.use_glab, self.no_use_glab) {
            config.origin.backend = if use_glab {
                OriginBackend::Glab
            } else {
                OriginBackend::Token
            };
        }
        if let Some(path) = &self.glab_path {
            config.origin.glab_path = path.clone();
        }
        if let Some(direction) = self.mirror_direction {
            config.mirror.direction = direction.into();
        }
        if let Some(allow) = flag_pair(self.allow_divergence, self.no_allow_divergence) {
            config.mirror.allow_divergence = allow;
        }
        if let Some(protected) =
            flag_pair(self.protected_branches_only, self.no_protected_branches_only)
        {
            config.mirror.protected_branches_only = protected;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let mut config = Config::load_or_default_from(&config_path)?;
    cli.apply_to(&mut config);
    config.expand_paths()?;

    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting mirrormaker v{}", env!("CARGO_PKG_VERSION"));

    if cli.save_config {
        config.save(&config_path)?;
        info!("Saved configuration to {:?}", config_path);
    }

    config.validate()?;

    let github = GitHubClient::new(&config.destination)
        .await
        .context("GitHub authentication failed")?;
    let origin = connect_origin(&config, &github).await?;

    let reconciler = Reconciler::new(
        origin.clone(),
        Arc::new(github),
        ReconcileOptions {
            dry_run: config.dry_run,
            mirror: config.mirror,
        },
    );

    let summary = match &cli.repo {
        Some(repo) => {
            let project = resolve_repo(origin.as_ref(), repo).await?;
            reconciler.reconcile(vec![project]).await?
        }
        None => reconciler.run().await?,
    };

    if config.dry_run {
        println!("Dry run: nothing was created.\n");
    }
    print!("{}", summary);

    if !summary.is_success() {
        warn!("{} repositories failed", summary.failures().len());
    }

    Ok(summary.exit_code())
}

/// Initialize logging; RUST_LOG wins over the flag and the configured level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let default_level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("Invalid log level: {}", default_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Build the configured GitLab backend, failing fast on authentication
async fn connect_origin(config: &Config, github: &GitHubClient) -> Result<Arc<dyn OriginClient>> {
    match config.origin.backend {
        OriginBackend::Token => {
            let token = config.origin.token.as_deref().unwrap_or_default();
            let client = GitLabClient::new(
                &config.origin.host,
                token,
                github.push_credential(),
                config.timeout(),
            )?;
            info!("Using GitLab API at {}", client.api_base());
            Ok(Arc::new(client))
        }
        OriginBackend::Glab => {
            let client = GlabClient::connect(
                ProcessRunner,
                &config.origin.glab_path,
                glab_hostname(&config.origin.host),
                config.timeout(),
            )
            .await?;
            info!("Using glab CLI at {}", config.origin.glab_path);
            Ok(Arc::new(client))
        }
    }
}

/// glab expects a bare hostname
fn glab_hostname(host: &str) -> &str {
    let host = host.trim().trim_end_matches('/');
    host.split_once("://").map_or(host, |(_, rest)| rest)
}

/// Resolve the REPO argument to a public project
async fn resolve_repo(
    origin: &dyn OriginClient,
    repo: &str,
) -> Result<OriginProject> {
    let repo = repo.trim().trim_matches('/');
    if repo.is_empty() {
        bail!("Repository name must not be empty");
    }

    let path = if repo.contains('/') {
        repo.to_string()
    } else {
        let user = origin.current_user().await?;
        format!("{}/{}", user, repo)
    };

    info!("Getting GitLab repository: {}", path);
    match origin.find_public_project(&path).await? {
        Some(project) => Ok(project),
        None => bail!("Public GitLab repository not found: {}", path),
    }
}
