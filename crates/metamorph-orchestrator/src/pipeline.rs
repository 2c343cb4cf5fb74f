//! The healing pipeline
//!
//! One run: download the repository archive into a fresh working area,
//! snapshot it, let the agent work, snapshot again, and publish whatever
//! changed as a pull request. The working area is removed on every exit path.

use crate::branch::BranchNamer;
use crate::envelope::HealingResponse;
use crate::lease::RepositoryLeases;
use crate::notify::Notifier;
use crate::publisher::{truncate_chars, Publisher};
use metamorph_agent::{AgentRun, AgentRunner};
use metamorph_core::{
    ChangeSet, HealingRequest, MetamorphConfig, MetamorphError, PublicationResult, Result,
};
use metamorph_github::HostingApi;
use metamorph_snapshot::{capture, detect_changes, detect_removed, extract_archive, WorkingArea};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Settings the pipeline needs, lifted out of [`MetamorphConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub base_branch: String,
    pub require_token: bool,
    pub agent_timeout: Duration,
    pub output_excerpt_chars: usize,
    /// Parent of working areas; system temp dir when `None`
    pub workspace_root: Option<PathBuf>,
    pub workspace_prefix: String,
}

impl PipelineConfig {
    pub fn from_config(config: &MetamorphConfig) -> Self {
        Self {
            base_branch: config.github.base_branch.clone(),
            require_token: config.github.require_token,
            agent_timeout: Duration::from_secs(config.agent.timeout_secs),
            output_excerpt_chars: config.agent.output_excerpt_chars,
            workspace_root: config.workspace.root.clone(),
            workspace_prefix: config.workspace.prefix.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&MetamorphConfig::default())
    }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealingOutcome {
    /// The agent left every text file as it was
    NoChanges { agent: AgentRun, removed: Vec<String> },
    /// Files changed but there was no token to publish with
    ChangesDetected {
        changes: ChangeSet,
        removed: Vec<String>,
        agent: AgentRun,
    },
    /// Changes were pushed and a pull request opened
    Published {
        publication: PublicationResult,
        removed: Vec<String>,
        agent: AgentRun,
    },
}

impl HealingOutcome {
    pub fn changes_made(&self) -> bool {
        !matches!(self, Self::NoChanges { .. })
    }
}

/// Runs healing requests against a hosting platform with a given agent
pub struct HealingPipeline {
    hosting: Arc<dyn HostingApi>,
    agent: Arc<dyn AgentRunner>,
    config: PipelineConfig,
    branches: BranchNamer,
    leases: RepositoryLeases,
    notifier: Notifier,
}

impl HealingPipeline {
    /// Create a pipeline with notifications disabled
    pub fn new(
        hosting: Arc<dyn HostingApi>,
        agent: Arc<dyn AgentRunner>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            hosting,
            agent,
            config,
            branches: BranchNamer::new(),
            leases: RepositoryLeases::default(),
            notifier: Notifier::disabled(),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run one healing request end to end
    pub async fn heal(&self, request: &HealingRequest) -> Result<HealingOutcome> {
        let request_id = Uuid::new_v4();
        let span = info_span!("heal", %request_id, repository = %request.repository);

        async move {
            info!("Healing {}: {}", request.repository, request.mission);
            self.notifier.status(
                "ANALYZING",
                &format!("Healing {}: {}", request.repository, request.mission),
                "info",
            );

            let result = self.run(request).await;

            match &result {
                Ok(outcome @ HealingOutcome::NoChanges { .. }) => {
                    info!("No changes needed");
                    self.notifier
                        .status("NO_CHANGES", &self.summary(request, outcome), "info");
                }
                Ok(outcome) => {
                    info!("Healing complete");
                    self.notifier
                        .status("HEALED", &self.summary(request, outcome), "success");
                }
                Err(e) => {
                    error!("Healing failed: {}", e);
                    self.notifier.status(
                        "FAILED",
                        &format!("Healing {} failed: {}", request.repository, e),
                        "error",
                    );
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Run a request and wrap the result in the response envelope
    pub async fn heal_to_response(&self, request: &HealingRequest) -> HealingResponse {
        match self.heal(request).await {
            Ok(outcome) => HealingResponse::from_outcome(&outcome, self.config.output_excerpt_chars),
            Err(e) => HealingResponse::from_error(&e),
        }
    }

    fn summary(&self, request: &HealingRequest, outcome: &HealingOutcome) -> String {
        match outcome {
            HealingOutcome::NoChanges { .. } => {
                format!("No changes needed for {}", request.repository)
            }
            HealingOutcome::ChangesDetected { changes, .. } => format!(
                "{} file(s) changed in {}, no token to open a PR",
                changes.len(),
                request.repository
            ),
            HealingOutcome::Published { publication, .. } => format!(
                "Opened {} for {}",
                publication.pull_request_url, request.repository
            ),
        }
    }

    async fn run(&self, request: &HealingRequest) -> Result<HealingOutcome> {
        self.agent.check_ready()?;

        if self.config.require_token && request.token().is_none() {
            return Err(MetamorphError::Authorization(
                "GitHub token is required".to_string(),
            ));
        }

        let area = WorkingArea::create(
            self.config.workspace_root.as_deref(),
            &self.config.workspace_prefix,
        )?;

        let result = self.run_in(&area, request).await;

        if let Err(e) = area.close() {
            warn!("Failed to remove working area: {}", e);
        }

        result
    }

    async fn run_in(&self, area: &WorkingArea, request: &HealingRequest) -> Result<HealingOutcome> {
        let repo = &request.repository;

        let archive = self
            .hosting
            .download_archive(repo, &self.config.base_branch, request.token())
            .await?;
        let repo_dir = extract_archive(archive, area.path().to_path_buf()).await?;

        let before = capture(repo_dir.clone()).await?;
        info!("Captured {} files before the agent run", before.len());

        let agent = self
            .agent
            .run(&repo_dir, &request.mission, self.config.agent_timeout)
            .await?;
        info!(
            "Agent exited with {:?} after {:.1}s",
            agent.exit_code,
            agent.elapsed.as_secs_f64()
        );

        let after = capture(repo_dir).await?;
        let changes = detect_changes(&before, &after);
        let removed = detect_removed(&before, &after);
        for path in &removed {
            warn!("Agent removed {}; deletions are not published", path);
        }

        if changes.is_empty() {
            return Ok(HealingOutcome::NoChanges { agent, removed });
        }
        info!("Detected {} changed file(s)", changes.len());

        let Some(token) = request.token() else {
            info!("No access token, skipping publication");
            return Ok(HealingOutcome::ChangesDetected {
                changes,
                removed,
                agent,
            });
        };

        let _lease = self.leases.acquire(repo).await;
        let branch = self.branches.next();
        let excerpt = truncate_chars(&agent.stdout, self.config.output_excerpt_chars);

        let publication = Publisher::new(self.hosting.as_ref(), &self.config.base_branch)
            .publish(repo, token, &branch, &changes, &request.mission, excerpt)
            .await?;

        Ok(HealingOutcome::Published {
            publication,
            removed,
            agent,
        })
    }
}
