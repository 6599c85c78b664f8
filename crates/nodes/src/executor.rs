//! The pipeline executor.
//!
//! Drives one run through its stages in a fixed order:
//!
//! ```text
//! Idle -> Triaged -> Planned -> FilesIdentified -> Proposing <-> Reviewing
//!      -> BranchReady -> Committed -> Reported -> Done
//! ```
//!
//! with a single early exit (`FilesIdentified -> PartiallyReported`) when no
//! target file is identified. Structured facts (issue details, branch and
//! commit outcomes) are mined from the capability payloads recorded in each
//! invocation trace, never parsed out of the agent's prose, except for the
//! documented branch fallback.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use pipeline::{
    base_commit_message, ideal_branch_name, parse_operations, AbsentReason, AgentRuntime,
    BatchCommitResult, BranchName, BranchPrefix, BranchState, ChangeExplanation, CommitOutcome, CommitPlan,
    CommitReport, CommitStatus, FileAction, FilePath, HostErrorStatus, Invocation, IssueContext,
    IssueNumber, OperationSet, OriginalFile, OriginalFileSnapshot, PipelineError, PipelineRunId,
    RepositoryHost, RepositoryRef, ReviewAspect, ReviewOutcome, ReviewSummary, ReviewVerdict,
    RoleAgent, RunConfig, RunReport, RunStage, Timestamp, TokenUsage,
};

use crate::agents::RoleSet;
use crate::prompts;
use crate::tools::{Toolbox, COMMIT_FILES, CREATE_BRANCH, DELETE_FILE, DOWNLOAD_ISSUE, POST_COMMENT};

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Correlation id carried on every span of the run.
    pub run_id: PipelineRunId,
    /// [`RunStage::Done`] or [`RunStage::PartiallyReported`].
    pub final_stage: RunStage,
    /// The report that was (or was meant to be) posted.
    pub report: RunReport,
    /// `true` if the comment-poster's capability call succeeded.
    pub comment_posted: bool,
    /// Token usage summed over every invocation of the run.
    pub usage: TokenUsage,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run reached its final stage.
    pub finished_at: Timestamp,
}

/// Mutable bookkeeping for one run.
struct RunState {
    stage: RunStage,
    usage: TokenUsage,
}

impl RunState {
    fn advance(&mut self, next: RunStage) {
        info!(from = %self.stage, to = %next, "Stage transition");
        self.stage = next;
    }
}

/// Immutable per-run context shared by the stages.
struct RunContext {
    repository: RepositoryRef,
    issue: IssueContext,
    issue_url: String,
    default_branch: BranchName,
    plan: String,
}

/// Resolves the target repository from a `name` or `owner/name` argument and
/// an optional owner override.
pub fn resolve_repository(repo: &str, owner: Option<&str>) -> Result<RepositoryRef, PipelineError> {
    RepositoryRef::resolve(repo, owner).ok_or_else(|| PipelineError::RepositoryUnresolved {
        input: match owner {
            Some(owner) => format!("{owner}/{repo}"),
            None => repo.to_string(),
        },
    })
}

/// Splits the file identifier's answer into paths.
///
/// One path per line; list bullets, numbering, backticks and quotes are
/// stripped. A bare line containing whitespace is prose, not a path; a path
/// with spaces is only recognised when the whole line is one backticked
/// token (`` `docs/user guide.md` ``). A `None` line is the empty sentinel.
/// Duplicates keep their first position.
pub fn parse_identified_files(text: &str) -> Vec<FilePath> {
    let mut paths: Vec<FilePath> = Vec::new();
    for line in text.lines() {
        let mut candidate = line.trim();
        candidate = candidate.trim_start_matches(|c: char| matches!(c, '-' | '*' | '+' | '•'));
        let numbered = candidate.trim_start_matches(|c: char| c.is_ascii_digit());
        if numbered.len() < candidate.len() {
            if let Some(rest) = numbered.strip_prefix('.').or_else(|| numbered.strip_prefix(')')) {
                candidate = rest;
            }
        }
        let candidate = candidate.trim();
        let quoted = candidate
            .strip_prefix('`')
            .and_then(|rest| rest.strip_suffix('`'))
            .filter(|inner| !inner.contains('`'));
        let candidate = quoted
            .unwrap_or_else(|| candidate.trim_matches(|c: char| matches!(c, '`' | '"' | '\'')))
            .trim()
            .trim_start_matches("./");

        if candidate.is_empty()
            || (quoted.is_none() && candidate.chars().any(char::is_whitespace))
            || candidate.ends_with(':')
            || candidate.trim_end_matches('.').eq_ignore_ascii_case("none")
        {
            continue;
        }
        if let Some(path) = FilePath::new(candidate) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Runs the issue-resolution pipeline.
pub struct PipelineExecutor {
    host: Arc<dyn RepositoryHost>,
    runtime: Arc<dyn AgentRuntime>,
    roles: RoleSet,
    config: RunConfig,
}

impl PipelineExecutor {
    /// Builds the role set for `config.model` and binds its capabilities to
    /// `host`.
    pub fn new(
        host: Arc<dyn RepositoryHost>,
        runtime: Arc<dyn AgentRuntime>,
        config: RunConfig,
    ) -> Self {
        let tools = Toolbox::new(host.clone());
        let roles = RoleSet::new(&tools, &config.model);
        Self {
            host,
            runtime,
            roles,
            config,
        }
    }

    /// Runs every stage for `issue` in `repository`.
    ///
    /// Returns `Err` only for conditions that halt a run: invalid
    /// configuration, an unavailable default branch, failed triage, or an
    /// agent invocation failing in a stage the report depends on. Everything
    /// else (failed branch, failed commits, failed comment) is recorded in the
    /// outcome.
    pub async fn run(
        &self,
        repository: RepositoryRef,
        issue: IssueNumber,
    ) -> Result<RunOutcome, PipelineError> {
        self.config.validate()?;
        let run_id = PipelineRunId::new_random();
        let span = info_span!(
            "pipeline_run",
            run_id = %run_id,
            repository = %repository,
            issue = %issue,
        );
        self.execute(run_id, repository, issue).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: PipelineRunId,
        repository: RepositoryRef,
        number: IssueNumber,
    ) -> Result<RunOutcome, PipelineError> {
        let started_at = Timestamp::now();
        let mut state = RunState {
            stage: RunStage::Idle,
            usage: TokenUsage::default(),
        };
        info!(started_at = %started_at, "Starting pipeline run");

        let default_branch = match self.host.get_default_branch(&repository).await {
            Ok(branch) => branch,
            Err(e) => {
                warn!(error = %e, "Default branch lookup failed");
                return Err(PipelineError::DefaultBranchUnavailable { repository });
            }
        };
        debug!(branch = %default_branch, "Resolved default branch");

        // Triage
        let issue_url = repository.issue_url(number);
        let (issue, triage_summary) = self
            .triage(&issue_url, number, &mut state)
            .instrument(info_span!("triage"))
            .await?;
        state.advance(RunStage::Triaged);
        let mut report = RunReport::new(repository.clone(), issue.clone(), triage_summary.clone());

        // Plan
        let plan = self
            .invoke(&self.roles.planner, prompts::plan(&issue, &triage_summary), &mut state)
            .instrument(info_span!("plan"))
            .await?
            .final_output;
        report.plan = Some(plan.clone());
        state.advance(RunStage::Planned);

        let ctx = RunContext {
            repository,
            issue,
            issue_url,
            default_branch,
            plan,
        };

        // File identification
        let paths = self
            .identify_files(&ctx, &mut state)
            .instrument(info_span!("file_identification"))
            .await?;
        report.identified_files = paths.clone();
        state.advance(RunStage::FilesIdentified);

        if paths.is_empty() {
            warn!("No target files identified; posting a partial report");
            report.early_exit = Some(
                "No files were identified for modification, so no changes were proposed or committed."
                    .to_string(),
            );
            if self.config.show_token_summary {
                report.token_usage = Some(state.usage);
            }
            let comment_posted = self.post_report(&ctx, &report, &mut state).await;
            state.advance(RunStage::PartiallyReported);
            return Ok(RunOutcome {
                run_id,
                final_stage: state.stage,
                report,
                comment_posted,
                usage: state.usage,
                started_at,
                finished_at: Timestamp::now(),
            });
        }

        let snapshot = self
            .snapshot(&ctx, &paths)
            .instrument(info_span!("snapshot"))
            .await;

        // Propose and review
        let (operations, review) = self
            .propose_and_review(&ctx, &paths, &snapshot, &mut state)
            .instrument(info_span!("propose_review"))
            .await?;
        report.operations = operations.clone();
        report.review = Some(review);

        // Branch and commit
        let plan = CommitPlan::from_operations(&operations);
        if plan.is_empty() {
            info!("No file changes to commit; skipping branch creation");
            report.commit = Some(CommitReport::not_attempted("no file changes were proposed"));
        } else {
            let branch = self
                .ensure_branch(&ctx, &mut state)
                .instrument(info_span!("branch"))
                .await?;
            let commit = if branch.success {
                state.advance(RunStage::BranchReady);
                let commit = self
                    .commit(&ctx, &branch.actual, &plan, &mut state)
                    .instrument(info_span!("commit"))
                    .await?;
                state.advance(RunStage::Committed);
                commit
            } else {
                warn!(branch = %branch.ideal, "Branch unavailable; commit not attempted");
                CommitReport::not_attempted("the working branch could not be created")
            };
            report.branch = Some(branch);
            report.commit = Some(commit);
        }

        // Explanations
        if report.commit.as_ref().is_some_and(CommitReport::overall_success) {
            report.explanations = self
                .explain(&ctx, &operations, &snapshot, &mut state)
                .instrument(info_span!("explain"))
                .await;
        }

        // Report
        if self.config.show_token_summary {
            report.token_usage = Some(state.usage);
        }
        let comment_posted = self.post_report(&ctx, &report, &mut state).await;
        state.advance(RunStage::Reported);
        state.advance(RunStage::Done);

        let finished_at = Timestamp::now();
        info!(
            comment_posted,
            input_tokens = %state.usage.input,
            output_tokens = %state.usage.output,
            elapsed_secs = started_at.seconds_until(finished_at),
            "Pipeline run complete"
        );
        Ok(RunOutcome {
            run_id,
            final_stage: state.stage,
            report,
            comment_posted,
            usage: state.usage,
            started_at,
            finished_at,
        })
    }

    async fn invoke(
        &self,
        agent: &RoleAgent,
        input: String,
        state: &mut RunState,
    ) -> Result<Invocation, PipelineError> {
        debug!(agent = %agent.name, "Invoking agent");
        let invocation = self
            .runtime
            .invoke(agent, &input)
            .await
            .map_err(|source| PipelineError::Agent {
                agent: agent.name.clone(),
                source,
            })?;
        state.usage += invocation.usage;
        Ok(invocation)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn triage(
        &self,
        issue_url: &str,
        number: IssueNumber,
        state: &mut RunState,
    ) -> Result<(IssueContext, String), PipelineError> {
        let invocation = self
            .invoke(&self.roles.triager, prompts::triage(issue_url), state)
            .await?;

        let payload = invocation
            .trace
            .last_result(DOWNLOAD_ISSUE)
            .ok_or_else(|| PipelineError::TriageFailed {
                issue: number,
                reason: format!("the triager never called {DOWNLOAD_ISSUE}"),
            })?;
        let issue = IssueContext::from_payload(payload)
            .map_err(|reason| PipelineError::TriageFailed { issue: number, reason })?;

        if issue.number != number {
            warn!(requested = %number, fetched = %issue.number, "Triager fetched a different issue");
        }
        info!(title = %issue.title, labels = %issue.labels_display(), "Issue triaged");
        Ok((issue, invocation.final_output))
    }

    async fn identify_files(
        &self,
        ctx: &RunContext,
        state: &mut RunState,
    ) -> Result<Vec<FilePath>, PipelineError> {
        if !self.config.target_files.is_empty() {
            info!(count = self.config.target_files.len(), "Using explicitly configured target files");
            return Ok(self.config.target_files.clone());
        }
        let invocation = self
            .invoke(
                &self.roles.file_identifier,
                prompts::identify_files(&ctx.issue, &ctx.plan, &ctx.repository, &ctx.default_branch),
                state,
            )
            .await?;
        let paths = parse_identified_files(&invocation.final_output);
        info!(count = paths.len(), "Identified target files");
        Ok(paths)
    }

    async fn snapshot(&self, ctx: &RunContext, paths: &[FilePath]) -> OriginalFileSnapshot {
        let mut snapshot = OriginalFileSnapshot::new();
        for path in paths {
            let file = match self
                .host
                .get_file_content(&ctx.repository, path, &ctx.default_branch)
                .await
            {
                Ok(file) => OriginalFile::Present {
                    content: file.content,
                    sha: Some(file.sha),
                },
                Err(e) if e.status == HostErrorStatus::NotFound => {
                    debug!(path = %path, "Target file does not exist yet");
                    OriginalFile::Absent {
                        reason: AbsentReason::NewFile,
                    }
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Original content unavailable");
                    OriginalFile::Absent {
                        reason: AbsentReason::Unavailable,
                    }
                }
            };
            snapshot.insert(path.clone(), file);
        }
        snapshot
    }

    async fn review(
        &self,
        aspect: ReviewAspect,
        ctx: &RunContext,
        working: &OperationSet,
        state: &mut RunState,
    ) -> Result<ReviewVerdict, PipelineError> {
        let invocation = self
            .invoke(
                self.roles.reviewer(aspect),
                prompts::review(&ctx.issue, &ctx.plan, working),
                state,
            )
            .await?;
        let verdict = ReviewVerdict::from_feedback(aspect, invocation.final_output);
        info!(aspect = %aspect, satisfied = verdict.satisfied, "Review complete");
        Ok(verdict)
    }

    /// The bounded propose/review loop. Returns the finalized (committable)
    /// operations and the review record.
    async fn propose_and_review(
        &self,
        ctx: &RunContext,
        paths: &[FilePath],
        snapshot: &OriginalFileSnapshot,
        state: &mut RunState,
    ) -> Result<(OperationSet, ReviewSummary), PipelineError> {
        let max_attempts = self.config.max_review_cycles;
        state.advance(RunStage::Proposing);
        let proposal = self
            .invoke(
                &self.roles.proposer,
                prompts::proposal(&ctx.issue, &ctx.plan, paths, snapshot),
                state,
            )
            .await?;
        let mut working = parse_operations(&proposal.final_output);
        let mut attempts = 1;
        let mut verdicts: Vec<ReviewVerdict> = Vec::new();
        if working.is_empty() {
            warn!("Proposal contained no recognisable file operations");
        }

        loop {
            if !working.has_changes() {
                let outcome = if verdicts.is_empty() {
                    info!(attempts, "No file changes proposed; review skipped");
                    ReviewOutcome::Skipped
                } else {
                    warn!(attempts, "Revision withdrew every change");
                    ReviewOutcome::ChangesWithdrawn
                };
                return Ok((
                    working.committable(),
                    ReviewSummary {
                        attempts,
                        outcome,
                        verdicts,
                    },
                ));
            }

            state.advance(RunStage::Reviewing);
            let technical = self.review(ReviewAspect::Technical, ctx, &working, state).await?;
            let style = self.review(ReviewAspect::Style, ctx, &working, state).await?;
            let approved = technical.satisfied && style.satisfied;
            verdicts = vec![technical, style];

            if approved {
                info!(attempts, "Both reviewers approved");
                return Ok((
                    working.committable(),
                    ReviewSummary {
                        attempts,
                        outcome: ReviewOutcome::Approved,
                        verdicts,
                    },
                ));
            }
            if attempts >= max_attempts {
                warn!(attempts, "Review cycles exhausted; using the last proposal as a best effort");
                return Ok((
                    working.committable(),
                    ReviewSummary {
                        attempts,
                        outcome: ReviewOutcome::CyclesExhausted,
                        verdicts,
                    },
                ));
            }

            state.advance(RunStage::Proposing);
            let revision = self
                .invoke(
                    &self.roles.proposer,
                    prompts::revision(&ctx.issue, &ctx.plan, paths, snapshot, &working, &verdicts),
                    state,
                )
                .await?;
            attempts += 1;
            let revised = parse_operations(&revision.final_output);
            if revised.is_empty() {
                warn!(attempts, "Revision contained no recognisable file operations; keeping the previous proposal");
                return Ok((
                    working.committable(),
                    ReviewSummary {
                        attempts,
                        outcome: ReviewOutcome::RevisionUnusable,
                        verdicts,
                    },
                ));
            }
            debug!(attempts, operations = revised.len(), "Revision parsed");
            working = revised;
        }
    }

    async fn ensure_branch(
        &self,
        ctx: &RunContext,
        state: &mut RunState,
    ) -> Result<BranchState, PipelineError> {
        let prefix = BranchPrefix::from_labels(&ctx.issue.labels);
        let ideal = ideal_branch_name(&ctx.issue.labels, ctx.issue.number);
        let invocation = self
            .invoke(
                &self.roles.branch_creator,
                prompts::create_branch(&ctx.repository, &ctx.issue, &ctx.default_branch, prefix),
                state,
            )
            .await?;

        let branch = match invocation
            .trace
            .last_result(CREATE_BRANCH)
            .and_then(|payload| BranchState::from_payload(ideal.clone(), payload))
        {
            Some(branch) => branch,
            None => {
                debug!("No interpretable branch payload; falling back to the agent summary");
                BranchState::from_summary(ideal, &invocation.final_output)
            }
        };
        if branch.success {
            info!(branch = %branch.actual, already_exists = branch.already_exists, "Branch ready");
        } else {
            warn!(
                branch = %branch.ideal,
                detail = branch.detail.as_deref().unwrap_or_default(),
                "Branch creation failed"
            );
        }
        Ok(branch)
    }

    async fn commit(
        &self,
        ctx: &RunContext,
        branch: &BranchName,
        plan: &CommitPlan,
        state: &mut RunState,
    ) -> Result<CommitReport, PipelineError> {
        let base_message = base_commit_message(&ctx.issue);
        let invocation = self
            .invoke(
                &self.roles.committer,
                prompts::commit(&ctx.repository, branch, &base_message, plan),
                state,
            )
            .await?;

        let mut reported: Vec<CommitOutcome> = invocation
            .trace
            .steps()
            .iter()
            .filter(|step| step.capability == DELETE_FILE)
            .filter_map(|step| {
                let path = step
                    .input
                    .get("file_path")
                    .and_then(Value::as_str)
                    .and_then(FilePath::new)?;
                Some(CommitOutcome::from_delete_payload(path, &step.output))
            })
            .collect();

        match invocation.trace.extract::<BatchCommitResult>(COMMIT_FILES) {
            Some(BatchCommitResult {
                details: Some(entries),
                ..
            }) => reported.extend(entries.iter().filter_map(CommitOutcome::from_detail)),
            Some(BatchCommitResult { error, .. }) => {
                // Rejected before any file was attempted (e.g. no token).
                let error = error.unwrap_or_else(|| "batch commit failed".to_string());
                warn!(error = %error, "Batch commit rejected");
                reported.extend(plan.upserts.iter().map(|change| CommitOutcome {
                    file_path: change.file_path.clone(),
                    status: CommitStatus::Failed,
                    detail: error.clone(),
                }));
            }
            None if invocation.trace.called(COMMIT_FILES) => {
                warn!("Batch commit result could not be decoded");
            }
            None if !plan.upserts.is_empty() => warn!("Committer never called {COMMIT_FILES}"),
            None => {}
        }

        let report = CommitReport::reconcile(plan, reported);
        info!(
            files = report.outcomes.len(),
            success = report.overall_success(),
            "Commit stage complete"
        );
        Ok(report)
    }

    /// One explanation per committed operation. An explainer failure is not
    /// fatal: the report falls back to the raw operations.
    async fn explain(
        &self,
        ctx: &RunContext,
        operations: &OperationSet,
        snapshot: &OriginalFileSnapshot,
        state: &mut RunState,
    ) -> Vec<ChangeExplanation> {
        let mut explanations = Vec::with_capacity(operations.len());
        for op in operations {
            if matches!(op.action, FileAction::NoChange) {
                continue;
            }
            let input = prompts::explain(
                &ctx.issue,
                &ctx.plan,
                op,
                snapshot.original_for(op),
            );
            match self.invoke(&self.roles.change_explainer, input, state).await {
                Ok(invocation) => explanations.push(ChangeExplanation {
                    file_path: op.file_path.clone(),
                    action: op.action.clone(),
                    explanation: invocation.final_output,
                }),
                Err(e) => {
                    warn!(error = %e, "Change explanation failed; reporting raw operations");
                    return Vec::new();
                }
            }
        }
        explanations
    }

    /// Posts the rendered report. Returns whether the comment landed.
    async fn post_report(&self, ctx: &RunContext, report: &RunReport, state: &mut RunState) -> bool {
        let body = report.render();
        let result = self
            .invoke(
                &self.roles.comment_poster,
                prompts::post_comment(&ctx.issue_url, &body),
                state,
            )
            .instrument(info_span!("report"))
            .await;
        let posted = match result {
            Ok(invocation) => invocation
                .trace
                .last_result(POST_COMMENT)
                .is_some_and(|payload| payload.get("error").is_none()),
            Err(e) => {
                warn!(error = %e, "Comment poster failed");
                false
            }
        };
        if posted {
            info!("Report posted to the issue");
        } else {
            warn!(issue_url = %ctx.issue_url, "Report was not posted");
        }
        posted
    }
}
