//! Maps origin projects onto existing destination repositories.

use futures::stream::{BoxStream, TryStreamExt};
use std::collections::HashMap;
use tracing::debug;

use crate::error::MirrorError;
use crate::model::{DestinationRepo, RepositoryRef};

/// Read-only name index over the destination listing, built once per run.
///
/// Matching is exact and case-sensitive on the repository name; the
/// destination namespace is never compared.
#[derive(Debug, Default)]
pub struct DestinationIndex {
    by_name: HashMap<String, DestinationRepo>,
}

impl DestinationIndex {
    pub fn from_repos(repos: impl IntoIterator<Item = DestinationRepo>) -> Self {
        let by_name = repos
            .into_iter()
            .map(|repo| (repo.repo.name.clone(), repo))
            .collect();
        Self { by_name }
    }

    /// Drain a destination listing into an index.
    pub async fn collect(
        listing: BoxStream<'_, Result<DestinationRepo, MirrorError>>,
    ) -> Result<Self, MirrorError> {
        let repos: Vec<DestinationRepo> = listing.try_collect().await?;
        debug!("Indexed {} destination repositories", repos.len());
        Ok(Self::from_repos(repos))
    }

    pub fn find(&self, origin: &RepositoryRef) -> Option<&DestinationRepo> {
        self.by_name.get(&origin.name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
