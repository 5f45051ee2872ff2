//! mirrormaker - GitHub push mirrors for public GitLab repositories
//!
//! Every public project in the authenticated GitLab user's namespace should
//! have a same-named GitHub repository and a GitLab push mirror pointing at
//! it. A run creates whatever is missing and never modifies or deletes
//! anything that already exists.
//!
//! ## Core Features
//!
//! - **Two GitLab backends**: personal access token REST calls, or a pre-authenticated `glab` CLI
//! - **Idempotent reconciliation**: repeated runs converge and create nothing new
//! - **Dry run**: report intended actions without creating anything
//! - **Per-repository isolation**: one failing project never stops the others
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`origin`]: GitLab access through either backend
//! - [`github`]: GitHub API integration and authentication
//! - [`matcher`]: Name lookup of existing GitHub repositories
//! - [`reconcile`]: The mirror reconciler
//! - [`summary`]: Per-repository outcomes and the final report

pub mod config;
pub mod error;
pub mod github;
pub mod matcher;
pub mod model;
pub mod origin;
pub mod reconcile;
pub mod summary;

pub use config::{Config, OriginBackend};
pub use error::MirrorError;
pub use github::{DestinationClient, GitHubClient};
pub use matcher::DestinationIndex;
pub use model::{
    DestinationRepo, MirrorConfig, MirrorDirection, MirrorOptions, OriginProject, RepositoryRef,
    Visibility,
};
pub use origin::{GitLabClient, GlabClient, OriginClient};
pub use reconcile::{ReconcileOptions, Reconciler};
pub use summary::{ActionOutcome, RunSummary};
