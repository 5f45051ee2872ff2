//! Common test utilities and in-memory hosts for mirrormaker tests
#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mirrormaker::github::DestinationClient;
use mirrormaker::origin::{same_remote, strip_credentials, OriginClient};
use mirrormaker::{
    DestinationRepo, MirrorConfig, MirrorError, MirrorOptions, OriginProject, ReconcileOptions,
    Reconciler, RepositoryRef, Visibility,
};

/// Public origin project owned by `alice`
pub fn project(id: u64, name: &str) -> OriginProject {
    OriginProject {
        repo: RepositoryRef::new("alice", name),
        id,
        description: Some(format!("The {} project", name)),
        web_url: format!("https://gitlab.com/alice/{}", name),
        visibility: Visibility::Public,
    }
}

pub fn private_project(id: u64, name: &str) -> OriginProject {
    OriginProject {
        visibility: Visibility::NonPublic,
        ..project(id, name)
    }
}

/// GitLab stand-in. Stores mirror URLs masked the way GitLab reports them.
#[derive(Default)]
pub struct FakeOrigin {
    projects: Mutex<Vec<OriginProject>>,
    mirrors: Mutex<HashMap<u64, Vec<MirrorConfig>>>,
    fail_lookup: Mutex<HashSet<u64>>,
    fail_create: Mutex<HashSet<u64>>,
    fail_listing: Mutex<Option<MirrorError>>,
    pub lookups: AtomicUsize,
    pub creates: AtomicUsize,
}

impl FakeOrigin {
    pub fn with_projects(projects: Vec<OriginProject>) -> Arc<Self> {
        let origin = Self::default();
        *origin.projects.lock().unwrap() = projects;
        Arc::new(origin)
    }

    /// Pre-existing mirror of project `id` to `url`
    pub fn add_mirror(&self, id: u64, url: &str) {
        let mut mirrors = self.mirrors.lock().unwrap();
        let entry = mirrors.entry(id).or_default();
        let next_id = entry.len() as u64 + 1;
        entry.push(MirrorConfig {
            id: Some(next_id),
            url: mask(url),
            enabled: true,
            only_protected_branches: false,
            keep_divergent_refs: false,
        });
    }

    pub fn mirrors_of(&self, id: u64) -> Vec<MirrorConfig> {
        self.mirrors
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_mirrors(&self) -> usize {
        self.mirrors.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn fail_lookup_for(&self, id: u64) {
        self.fail_lookup.lock().unwrap().insert(id);
    }

    pub fn fail_create_for(&self, id: u64) {
        self.fail_create.lock().unwrap().insert(id);
    }

    pub fn fail_listing_with(&self, err: MirrorError) {
        *self.fail_listing.lock().unwrap() = Some(err);
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

/// Replace any credentials with GitLab's mask
fn mask(url: &str) -> String {
    let clean = strip_credentials(url);
    match clean.split_once("://") {
        Some((scheme, rest)) => format!("{}://*****:*****@{}", scheme, rest),
        None => clean,
    }
}

#[async_trait]
impl OriginClient for FakeOrigin {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn current_user(&self) -> Result<String, MirrorError> {
        Ok("alice".to_string())
    }

    fn list_public_projects<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<OriginProject, MirrorError>> {
        if let Some(err) = self.fail_listing.lock().unwrap().clone() {
            return stream::once(async move { Err(err) }).boxed();
        }
        let projects: Vec<Result<OriginProject, MirrorError>> = self
            .projects
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.repo.namespace == user && p.is_public())
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(projects).boxed()
    }

    async fn find_public_project(&self, path: &str) -> Result<Option<OriginProject>, MirrorError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.repo.full_path == path && p.is_public())
            .cloned())
    }

    async fn get_mirror_config(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
    ) -> Result<Option<MirrorConfig>, MirrorError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookup.lock().unwrap().contains(&project.id) {
            return Err(MirrorError::transport("HTTP 500: lookup failed"));
        }
        Ok(self
            .mirrors_of(project.id)
            .into_iter()
            .find(|m| same_remote(&m.url, destination_clone_url)))
    }

    async fn create_mirror_config(
        &self,
        project: &OriginProject,
        destination_clone_url: &str,
        options: &MirrorOptions,
    ) -> Result<MirrorConfig, MirrorError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.lock().unwrap().contains(&project.id) {
            return Err(MirrorError::transport("HTTP 500: mirror creation failed"));
        }

        let mut mirrors = self.mirrors.lock().unwrap();
        let entry = mirrors.entry(project.id).or_default();
        let created = MirrorConfig {
            id: Some(entry.len() as u64 + 1),
            url: mask(destination_clone_url),
            enabled: options.enabled,
            only_protected_branches: options.protected_branches_only,
            keep_divergent_refs: options.allow_divergence,
        };
        entry.push(created.clone());
        Ok(created)
    }
}

/// GitHub stand-in for user `bob`
pub struct FakeDestination {
    user: String,
    repos: Mutex<Vec<DestinationRepo>>,
    fail_create: Mutex<HashSet<String>>,
    pub creates: AtomicUsize,
}

impl FakeDestination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            user: "bob".to_string(),
            repos: Mutex::new(Vec::new()),
            fail_create: Mutex::new(HashSet::new()),
            creates: AtomicUsize::new(0),
        })
    }

    /// Pre-existing repository owned by `bob`
    pub fn add_repo(&self, name: &str, description: Option<&str>) {
        self.repos.lock().unwrap().push(DestinationRepo {
            repo: RepositoryRef::new(self.user.as_str(), name),
            description: description.map(str::to_string),
            homepage: None,
            clone_url: self.clone_url(name),
        });
    }

    pub fn repos(&self) -> Vec<DestinationRepo> {
        self.repos.lock().unwrap().clone()
    }

    pub fn repo(&self, name: &str) -> Option<DestinationRepo> {
        self.repos().into_iter().find(|r| r.repo.name == name)
    }

    pub fn fail_create_for(&self, name: &str) {
        self.fail_create.lock().unwrap().insert(name.to_string());
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationClient for FakeDestination {
    fn user(&self) -> &str {
        &self.user
    }

    fn clone_url(&self, name: &str) -> String {
        format!("https://github.com/{}/{}.git", self.user, name)
    }

    fn list_owned_repos<'a>(
        &'a self,
        user: &'a str,
    ) -> BoxStream<'a, Result<DestinationRepo, MirrorError>> {
        let repos: Vec<Result<DestinationRepo, MirrorError>> = self
            .repos()
            .into_iter()
            .filter(|r| r.repo.namespace == user)
            .map(Ok)
            .collect();
        stream::iter(repos).boxed()
    }

    async fn create_repo(
        &self,
        name: &str,
        description: &str,
        homepage: &str,
    ) -> Result<DestinationRepo, MirrorError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.lock().unwrap().contains(name) {
            return Err(MirrorError::transport("HTTP 502: bad gateway"));
        }

        let mut repos = self.repos.lock().unwrap();
        if repos.iter().any(|r| r.repo.name == name) {
            return Err(MirrorError::conflict(format!("name already exists: {}", name)));
        }

        let repo = DestinationRepo {
            repo: RepositoryRef::new(self.user.as_str(), name),
            description: Some(description.to_string()),
            homepage: Some(homepage.to_string()),
            clone_url: self.clone_url(name),
        };
        repos.push(repo.clone());
        Ok(repo)
    }
}

pub fn reconciler(origin: &Arc<FakeOrigin>, destination: &Arc<FakeDestination>, dry_run: bool) -> Reconciler {
    Reconciler::new(
        origin.clone(),
        destination.clone(),
        ReconcileOptions {
            dry_run,
            mirror: MirrorOptions::default(),
        },
    )
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
