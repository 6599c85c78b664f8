mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nodes::tools::{COMMIT_FILES, CREATE_BRANCH, DELETE_FILE, DOWNLOAD_ISSUE, POST_COMMENT};
use nodes::PipelineExecutor;
use pipeline::{
    CommitStatus, FilePath, IssueNumber, PipelineError, RepositoryRef, ReviewOutcome, RunConfig,
    RunStage,
};
use serde_json::json;

use support::{comment_body, InMemoryHost, Reply, ScriptedRuntime};

const ISSUE_URL: &str = "https://github.com/o/r/issues/12";
const BASE_MESSAGE: &str = "Propose solution for issue #12: Fix typo in README";

fn repo() -> RepositoryRef {
    RepositoryRef::new("o", "r").unwrap()
}

fn readme_host() -> InMemoryHost {
    InMemoryHost::new("o", "r")
        .with_issue(12, "Fix typo in README", "The README says Helo.", &["bug"])
        .with_file("main", "README.md", "Helo\n")
}

/// A runtime where every role does the expected thing for issue #12.
fn happy_runtime(issue_url: &'static str, branch: &'static str) -> ScriptedRuntime {
    ScriptedRuntime::new()
        .on("IssueTriager", move |_| {
            Reply::text("Bug: the README has a typo. Priority: Low.")
                .call(DOWNLOAD_ISSUE, json!({"issue_url": issue_url}))
        })
        .on("Planner", |_| Reply::text("1. Fix the typo in README.md"))
        .on("FileIdentifier", |_| Reply::text("README.md"))
        .on("CodeProposer", |_| {
            Reply::text("Changes for `README.md`:\n```markdown\nHello\n```\n")
        })
        .on("TechnicalReviewer", |_| Reply::text("LGTM!"))
        .on("StyleReviewer", |_| Reply::text("Approved"))
        .on("BranchCreator", move |_| {
            let (prefix, number) = branch.split_once("/issue-").unwrap();
            Reply::text("Branch created.").call(
                CREATE_BRANCH,
                json!({
                    "repo_owner": "o",
                    "repo_name": "r",
                    "issue_number": number.parse::<u64>().unwrap(),
                    "base_branch": "main",
                    "branch_prefix": prefix
                }),
            )
        })
        .on("CodeCommitter", move |_| {
            Reply::text("Committed README.md.").call(
                COMMIT_FILES,
                json!({
                    "repo_owner": "o",
                    "repo_name": "r",
                    "branch_name": branch,
                    "commit_message": BASE_MESSAGE,
                    "file_changes_list": [{"file_path": "README.md", "file_content": "Hello"}]
                }),
            )
        })
        .on("ChangeExplainer", |_| Reply::text("Corrected the spelling of Hello."))
        .on("CommentPoster", move |input| {
            Reply::text("Comment posted.").call(
                POST_COMMENT,
                json!({"issue_url": issue_url, "comment_body": comment_body(input)}),
            )
        })
}

fn executor(host: &Arc<InMemoryHost>, runtime: &Arc<ScriptedRuntime>, config: RunConfig) -> PipelineExecutor {
    PipelineExecutor::new(host.clone(), runtime.clone(), config)
}

#[tokio::test]
async fn test_single_file_fix_runs_end_to_end() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12"));

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    assert_eq!(outcome.final_stage, RunStage::Done);
    assert!(outcome.comment_posted);
    assert_eq!(host.file("fix/issue-12", "README.md").as_deref(), Some("Hello"));
    assert_eq!(host.file("main", "README.md").as_deref(), Some("Helo\n"));
    assert_eq!(host.commit_messages(), vec![BASE_MESSAGE.to_string()]);

    let comments = host.comments();
    assert_eq!(comments.len(), 1);
    let comment = &comments[0];
    for header in [
        "# Automated resolution for issue #12: Fix typo in README",
        "## Triage Summary",
        "## Plan",
        "## File Identification",
        "## Proposed Changes",
        "## Reviews",
        "## Commit Status",
    ] {
        assert!(comment.contains(header), "missing {header}");
    }
    assert!(comment.contains("Branch: `fix/issue-12` (created)"));
    assert!(comment.contains("### `README.md` (modify)"));
    assert!(comment.contains("Corrected the spelling of Hello."));
    assert!(comment.contains("Overall: success"));
    assert!(!comment.contains("## Token Usage"));

    let review = outcome.report.review.as_ref().unwrap();
    assert_eq!(review.attempts, 1);
    assert!(review.approved());

    // The proposer sees the original content.
    let proposal_prompt = runtime
        .invocations()
        .into_iter()
        .find(|(agent, _)| agent == "CodeProposer")
        .map(|(_, input)| input)
        .unwrap();
    assert!(proposal_prompt.contains("Helo"));

    assert_eq!(outcome.usage.requests as usize, runtime.invocations().len());
    assert!(outcome.started_at <= outcome.finished_at);
}

#[tokio::test]
async fn test_none_sentinel_posts_a_partial_report() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(
        happy_runtime(ISSUE_URL, "fix/issue-12").on("FileIdentifier", |_| Reply::text("None")),
    );

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    assert_eq!(outcome.final_stage, RunStage::PartiallyReported);
    assert!(outcome.comment_posted);
    assert_eq!(runtime.count("CodeProposer"), 0);
    assert_eq!(runtime.count("BranchCreator"), 0);
    assert!(!host.has_branch("fix/issue-12"));

    let comment = &host.comments()[0];
    assert!(comment.contains("## Outcome"));
    assert!(comment.contains("No files were identified."));
    assert!(!comment.contains("## Commit Status"));
}

#[tokio::test]
async fn test_review_loop_stops_at_the_configured_attempts() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(
        happy_runtime(ISSUE_URL, "fix/issue-12")
            .on("TechnicalReviewer", |_| Reply::text("Needs revision. Add a heading.")),
    );
    let config = RunConfig {
        max_review_cycles: 2,
        ..RunConfig::default()
    };

    let outcome = executor(&host, &runtime, config)
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    assert_eq!(runtime.count("CodeProposer"), 2);
    assert_eq!(runtime.count("TechnicalReviewer"), 2);
    assert_eq!(runtime.count("StyleReviewer"), 2);
    let review = outcome.report.review.as_ref().unwrap();
    assert_eq!(review.attempts, 2);
    assert!(!review.approved());

    // Best effort: the last proposal is still committed.
    assert_eq!(host.file("fix/issue-12", "README.md").as_deref(), Some("Hello"));
    assert!(host.comments()[0].contains("Review cycles were exhausted"));
}

#[tokio::test]
async fn test_revision_carries_feedback_and_replaces_the_proposal() {
    let host = Arc::new(readme_host());
    let reviews = Arc::new(AtomicUsize::new(0));
    let proposals = Arc::new(AtomicUsize::new(0));
    let runtime = Arc::new(
        happy_runtime(ISSUE_URL, "fix/issue-12")
            .on("TechnicalReviewer", {
                let reviews = reviews.clone();
                move |_: &str| match reviews.fetch_add(1, Ordering::SeqCst) {
                    0 => Reply::text("Needs revision. Say hello to the world."),
                    _ => Reply::text("Looks good to me."),
                }
            })
            .on("CodeProposer", {
                let proposals = proposals.clone();
                move |_: &str| match proposals.fetch_add(1, Ordering::SeqCst) {
                    0 => Reply::text("Changes for `README.md`:\n```\nHello\n```"),
                    _ => Reply::text("Revised.\n\nChanges for `README.md`:\n```\nHello, world\n```"),
                }
            }),
    );

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    let review = outcome.report.review.as_ref().unwrap();
    assert_eq!(review.attempts, 2);
    assert!(review.approved());

    let revision_prompt = runtime
        .invocations()
        .into_iter()
        .filter(|(agent, _)| agent == "CodeProposer")
        .nth(1)
        .map(|(_, input)| input)
        .unwrap();
    assert!(revision_prompt.contains("Technical Review:\nNeeds revision. Say hello to the world."));
    assert!(revision_prompt.contains("Changes for `README.md`:\n```\nHello\n```"));

    // The committer script is fixed, so check the finalized operations instead.
    assert_eq!(
        outcome.report.operations.iter().next().unwrap().code(),
        Some("Hello, world")
    );
}

#[tokio::test]
async fn test_existing_branch_counts_as_success() {
    let host = Arc::new(readme_host().with_branch("fix/issue-12"));
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12"));

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    let branch = outcome.report.branch.as_ref().unwrap();
    assert!(branch.success);
    assert!(branch.already_exists);
    assert_eq!(branch.actual.as_str(), "fix/issue-12");
    assert_eq!(host.file("fix/issue-12", "README.md").as_deref(), Some("Hello"));
    assert!(host.comments()[0].contains("Branch: `fix/issue-12` (already existed)"));
}

#[tokio::test]
async fn test_deletes_run_before_one_batched_upsert() {
    const URL: &str = "https://github.com/o/r/issues/7";
    const BASE: &str = "Propose solution for issue #7: Split config";
    let host = Arc::new(
        InMemoryHost::new("o", "r")
            .with_issue(7, "Split config", "Move settings out of a.txt.", &["enhancement"])
            .with_file("main", "a.txt", "A")
            .with_file("main", "b.txt", "B"),
    );
    let runtime = Arc::new(
        happy_runtime(URL, "feature/issue-7")
            .on("FileIdentifier", |_| Reply::text("- a.txt\n- b.txt\n- c.txt"))
            .on("CodeProposer", |_| {
                Reply::text(
                    "Delete file `a.txt`\n\nChanges for `b.txt`:\n```\nB2\n```\n\n\
                     Changes for `c.txt`:\n```\nC1\n```\n",
                )
            })
            .on("CodeCommitter", |_| {
                Reply::text("Done.")
                    .call(
                        DELETE_FILE,
                        json!({
                            "repo_owner": "o",
                            "repo_name": "r",
                            "branch_name": "feature/issue-7",
                            "file_path": "a.txt",
                            "commit_message": BASE
                        }),
                    )
                    .call(
                        COMMIT_FILES,
                        json!({
                            "repo_owner": "o",
                            "repo_name": "r",
                            "branch_name": "feature/issue-7",
                            "commit_message": BASE,
                            "file_changes_list": [
                                {"file_path": "b.txt", "file_content": "B2"},
                                {"file_path": "c.txt", "file_content": "C1"}
                            ]
                        }),
                    )
            }),
    );

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(7))
        .await
        .unwrap();

    assert_eq!(
        host.writes(),
        vec![
            "delete feature/issue-7:a.txt".to_string(),
            "put feature/issue-7:b.txt".to_string(),
            "put feature/issue-7:c.txt".to_string(),
        ]
    );
    assert_eq!(
        host.commit_messages(),
        vec![
            format!("{BASE} (delete a.txt)"),
            format!("{BASE} (file 1/2: b.txt)"),
            format!("{BASE} (file 2/2: c.txt)"),
        ]
    );

    let commit = outcome.report.commit.as_ref().unwrap();
    let paths: Vec<&str> = commit.outcomes.iter().map(|o| o.file_path.as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);
    assert!(commit.outcomes.iter().all(|o| o.status == CommitStatus::Success));
    assert_eq!(runtime.count("ChangeExplainer"), 3);

    let invocations = runtime.invocations();
    let commit_prompt = &invocations.iter().find(|(a, _)| a == "CodeCommitter").unwrap().1;
    assert!(commit_prompt.contains("- a.txt"));
    assert!(commit_prompt.contains("\"file_path\": \"c.txt\""));
    assert!(!commit_prompt.contains("\"file_path\": \"a.txt\""));

    let proposal_prompt = &invocations.iter().find(|(a, _)| a == "CodeProposer").unwrap().1;
    assert!(proposal_prompt.contains("Current content of `c.txt`:\n```\nnew file\n```"));
}

#[tokio::test]
async fn test_unreported_commit_paths_are_marked_skipped() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(
        happy_runtime(ISSUE_URL, "fix/issue-12")
            .on("CodeCommitter", |_| Reply::text("I decided not to commit.")),
    );

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    let commit = outcome.report.commit.as_ref().unwrap();
    assert_eq!(commit.outcomes.len(), 1);
    assert_eq!(commit.outcomes[0].status, CommitStatus::Skipped);
    assert!(!commit.overall_success());
    assert_eq!(runtime.count("ChangeExplainer"), 0);
    assert!(host.comments()[0].contains("Overall: failed"));
}

#[tokio::test]
async fn test_triage_without_issue_payload_is_fatal() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(
        happy_runtime(ISSUE_URL, "fix/issue-12")
            .on("IssueTriager", |_| Reply::text("I could not fetch the issue.")),
    );

    let err = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::TriageFailed { issue, .. } if issue == IssueNumber::new(12)));
    assert_eq!(runtime.count("Planner"), 0);
    assert!(host.comments().is_empty());
}

#[tokio::test]
async fn test_triage_with_error_payload_is_fatal() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(happy_runtime("https://github.com/o/r/issues/99", "fix/issue-12"));

    let err = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::TriageFailed { .. }));
}

#[tokio::test]
async fn test_unavailable_default_branch_halts_before_any_agent_runs() {
    let host = Arc::new(readme_host().without_default_branch());
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12"));

    let err = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::DefaultBranchUnavailable { .. }));
    assert!(runtime.invocations().is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_the_run() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12"));
    let config = RunConfig {
        max_review_cycles: 0,
        ..RunConfig::default()
    };

    let err = executor(&host, &runtime, config)
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Configuration { .. }));
    assert!(runtime.invocations().is_empty());
}

#[tokio::test]
async fn test_without_a_token_nothing_is_written() {
    let host = Arc::new(readme_host().unauthenticated());
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12"));

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    assert_eq!(outcome.final_stage, RunStage::Done);
    assert!(!outcome.comment_posted);
    let branch = outcome.report.branch.as_ref().unwrap();
    assert!(!branch.success);
    assert_eq!(
        branch.detail.as_deref(),
        Some("GitHub token is required to create a branch.")
    );
    assert!(outcome.report.commit.as_ref().unwrap().not_attempted.is_some());
    assert_eq!(runtime.count("CodeCommitter"), 0);
    assert!(host.writes().is_empty());
    assert!(host.comments().is_empty());
}

#[tokio::test]
async fn test_explicit_target_files_skip_identification() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12"));
    let config = RunConfig {
        target_files: vec![FilePath::new("README.md").unwrap()],
        show_token_summary: true,
        ..RunConfig::default()
    };

    let outcome = executor(&host, &runtime, config)
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    assert_eq!(runtime.count("FileIdentifier"), 0);
    assert_eq!(outcome.report.identified_files, vec![FilePath::new("README.md").unwrap()]);
    assert!(host.comments()[0].contains("## Token Usage"));
}

#[tokio::test]
async fn test_no_change_proposal_skips_branch_and_commit() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(
        happy_runtime(ISSUE_URL, "fix/issue-12")
            .on("CodeProposer", |_| Reply::text("No changes needed for `README.md`.")),
    );

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    assert_eq!(outcome.final_stage, RunStage::Done);
    assert_eq!(runtime.count("TechnicalReviewer"), 0);
    assert_eq!(runtime.count("BranchCreator"), 0);
    assert!(outcome.report.operations.is_empty());
    let comment = &host.comments()[0];
    assert!(comment.contains("No changes were proposed."));
    assert!(comment.contains("Commit not attempted"));
}

#[tokio::test]
async fn test_agent_failure_halts_the_run() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12").without("Planner"));

    let err = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Agent { ref agent, .. } if agent == "Planner"));
}

#[tokio::test]
async fn test_explainer_failure_falls_back_to_raw_operations() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12").without("ChangeExplainer"));

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    assert!(outcome.report.explanations.is_empty());
    assert!(host.comments()[0].contains("Changes for `README.md`:"));
}

/// Scripts the proposer: the first call proposes `Hello`, later calls answer
/// with `revision`.
fn proposer_then(revision: &'static str) -> impl Fn(&str) -> Reply + Send + Sync + 'static {
    let proposals = AtomicUsize::new(0);
    move |_: &str| match proposals.fetch_add(1, Ordering::SeqCst) {
        0 => Reply::text("Changes for `README.md`:\n```\nHello\n```"),
        _ => Reply::text(revision),
    }
}

#[tokio::test]
async fn test_unusable_revision_keeps_the_reviewed_proposal() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(
        happy_runtime(ISSUE_URL, "fix/issue-12")
            .on("TechnicalReviewer", |_| Reply::text("Needs revision. Add a heading."))
            .on("CodeProposer", proposer_then("I can't improve this.")),
    );

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    assert_eq!(runtime.count("CodeProposer"), 2);
    assert_eq!(runtime.count("TechnicalReviewer"), 1);
    assert_eq!(runtime.count("StyleReviewer"), 1);
    let review = outcome.report.review.as_ref().unwrap();
    assert_eq!(review.attempts, 2);
    assert_eq!(review.outcome, ReviewOutcome::RevisionUnusable);
    assert_eq!(review.verdicts.len(), 2);

    assert_eq!(outcome.report.operations.iter().next().unwrap().code(), Some("Hello"));
    assert_eq!(host.file("fix/issue-12", "README.md").as_deref(), Some("Hello"));
    let comment = &host.comments()[0];
    assert!(comment.contains("previously reviewed proposal is used"));
    assert!(!comment.contains("Review cycles were exhausted"));
    assert!(comment.contains("Needs revision. Add a heading."));
}

#[tokio::test]
async fn test_withdrawn_revision_keeps_review_feedback() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(
        happy_runtime(ISSUE_URL, "fix/issue-12")
            .on("TechnicalReviewer", |_| Reply::text("Needs revision: this breaks the build."))
            .on("CodeProposer", proposer_then("No changes needed for `README.md`.")),
    );

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    let review = outcome.report.review.as_ref().unwrap();
    assert_eq!(review.attempts, 2);
    assert_eq!(review.outcome, ReviewOutcome::ChangesWithdrawn);
    assert_eq!(review.verdicts.len(), 2);
    assert_eq!(runtime.count("TechnicalReviewer"), 1);
    assert_eq!(runtime.count("BranchCreator"), 0);

    let comment = &host.comments()[0];
    assert!(comment.contains("withdrew all changes"));
    assert!(comment.contains("Needs revision: this breaks the build."));
    assert!(!comment.contains("Review skipped"));
}

#[tokio::test]
async fn test_negated_branch_summary_is_a_failure() {
    let host = Arc::new(readme_host());
    let runtime = Arc::new(happy_runtime(ISSUE_URL, "fix/issue-12").on("BranchCreator", |_| {
        Reply::text("The branch could not be created: permission denied.")
    }));

    let outcome = executor(&host, &runtime, RunConfig::default())
        .run(repo(), IssueNumber::new(12))
        .await
        .unwrap();

    let branch = outcome.report.branch.as_ref().unwrap();
    assert!(!branch.success);
    assert_eq!(runtime.count("CodeCommitter"), 0);
    assert!(host.writes().is_empty());
    let comment = &host.comments()[0];
    assert!(comment.contains("`fix/issue-12` (creation failed)"));
    assert!(comment.contains("> The branch could not be created: permission denied."));
}
