//! Run Summary - per-repository outcomes and the aggregate report
//!
//! Outcomes are kept in processing order. The run counts as failed as soon as
//! one repository has a [`ActionOutcome::Failed`] entry, but the rendering
//! always lists every repository.

use std::fmt;
use std::process::ExitCode;
use std::time::Duration;

use crate::error::MirrorError;
use crate::model::RepositoryRef;

/// Result of one action on one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    RepoCreated,
    RepoAlreadyExists,
    MirrorCreated,
    MirrorAlreadyExists,
    /// Action that dry-run mode did not perform
    Skipped(String),
    Failed(MirrorError),
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ActionOutcome::Failed(_))
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::RepoCreated => write!(f, "\u{2714} repo created"),
            ActionOutcome::RepoAlreadyExists => write!(f, "\u{2714} repo exists"),
            ActionOutcome::MirrorCreated => write!(f, "\u{2714} mirror created"),
            ActionOutcome::MirrorAlreadyExists => write!(f, "\u{2714} mirror exists"),
            ActionOutcome::Skipped(reason) => write!(f, "- skipped ({})", reason),
            ActionOutcome::Failed(_) => write!(f, "\u{2718} failed"),
        }
    }
}

/// Everything that happened to one origin repository
#[derive(Debug, Clone)]
pub struct RepoOutcome {
    pub repo: RepositoryRef,
    pub outcomes: Vec<ActionOutcome>,
}

impl RepoOutcome {
    pub fn error(&self) -> Option<&MirrorError> {
        self.outcomes.iter().find_map(|outcome| match outcome {
            ActionOutcome::Failed(err) => Some(err),
            _ => None,
        })
    }
}

/// Number of outcomes of each kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub repos_created: usize,
    pub repos_existing: usize,
    pub mirrors_created: usize,
    pub mirrors_existing: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Results from a complete reconciliation run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    entries: Vec<RepoOutcome>,
    duration: Duration,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, repo: RepositoryRef, outcomes: Vec<ActionOutcome>) {
        self.entries.push(RepoOutcome { repo, outcomes });
    }

    pub fn finish(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn entries(&self) -> &[RepoOutcome] {
        &self.entries
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Outcomes recorded for `full_path`, if that repository was processed
    pub fn outcomes_for(&self, full_path: &str) -> Option<&[ActionOutcome]> {
        self.entries
            .iter()
            .find(|entry| entry.repo.full_path == full_path)
            .map(|entry| entry.outcomes.as_slice())
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();

        for outcome in self.entries.iter().flat_map(|entry| &entry.outcomes) {
            match outcome {
                ActionOutcome::RepoCreated => counts.repos_created += 1,
                ActionOutcome::RepoAlreadyExists => counts.repos_existing += 1,
                ActionOutcome::MirrorCreated => counts.mirrors_created += 1,
                ActionOutcome::MirrorAlreadyExists => counts.mirrors_existing += 1,
                ActionOutcome::Skipped(_) => counts.skipped += 1,
                ActionOutcome::Failed(_) => counts.failed += 1,
            }
        }

        counts
    }

    /// Repositories that need attention, with the error that stopped them
    pub fn failures(&self) -> Vec<(&RepositoryRef, &MirrorError)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.error().map(|err| (&entry.repo, err)))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const HEADERS: [&str; 2] = ["GitLab repo", "Outcome"];

        let rows: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|entry| {
                let outcomes = entry
                    .outcomes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                (entry.repo.full_path.clone(), outcomes)
            })
            .collect();

        let width = rows
            .iter()
            .map(|(repo, _)| repo.chars().count())
            .chain(std::iter::once(HEADERS[0].len()))
            .max()
            .unwrap_or_default();
        let outcome_width = rows
            .iter()
            .map(|(_, outcome)| outcome.chars().count())
            .chain(std::iter::once(HEADERS[1].len()))
            .max()
            .unwrap_or_default();

        writeln!(f, "{:<width$} | {}", HEADERS[0], HEADERS[1], width = width)?;
        writeln!(f, "{}-+-{}", "-".repeat(width), "-".repeat(outcome_width))?;
        for (repo, outcome) in &rows {
            writeln!(f, "{:<width$} | {}", repo, outcome, width = width)?;
        }

        let counts = self.counts();
        writeln!(f)?;
        writeln!(
            f,
            "{} repositories in {:.2}s: {} repos created, {} repos existing, {} mirrors created, {} mirrors existing, {} skipped, {} failed",
            self.entries.len(),
            self.duration.as_secs_f64(),
            counts.repos_created,
            counts.repos_existing,
            counts.mirrors_created,
            counts.mirrors_existing,
            counts.skipped,
            counts.failed
        )?;

        let failures = self.failures();
        if !failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed repositories:")?;
            for (repo, err) in failures {
                writeln!(f, "  \u{2718} {}: {}", repo, err)?;
            }
        }

        Ok(())
    }
}
