//! Input text for each role invocation.

use std::fmt::Write as _;

use serde_json::json;

use pipeline::{
    proposed_text, BranchName, BranchPrefix, CommitPlan, FileOperation, FilePath, IssueContext,
    OperationSet, OriginalFileSnapshot, RepositoryRef, ReviewVerdict,
};

fn issue_block(issue: &IssueContext) -> String {
    format!(
        "Issue #{number}: {title}\nURL: {url}\nLabels: {labels}\n\nIssue body:\n{body}\n",
        number = issue.number,
        title = issue.title,
        url = issue.url,
        labels = issue.labels_display(),
        body = issue.body,
    )
}

fn originals_block(paths: &[FilePath], snapshot: &OriginalFileSnapshot) -> String {
    let mut out = String::new();
    for path in paths {
        let _ = write!(
            out,
            "Current content of `{path}`:\n```\n{}\n```\n\n",
            snapshot.original_text(path)
        );
    }
    out
}

/// Triage: the only input is the issue URL.
pub fn triage(issue_url: &str) -> String {
    format!("Please triage the GitHub issue at {issue_url}")
}

/// Planning.
pub fn plan(issue: &IssueContext, triage_summary: &str) -> String {
    format!(
        "{}\nTriage summary:\n{triage_summary}\n\nWrite the step-by-step plan for resolving this issue.",
        issue_block(issue)
    )
}

/// File identification.
pub fn identify_files(
    issue: &IssueContext,
    plan: &str,
    repository: &RepositoryRef,
    branch: &BranchName,
) -> String {
    format!(
        "{}\nPlan:\n{plan}\n\nRepository owner: {owner}\nRepository name: {name}\nBranch: {branch}\n\n\
         List the files that must change, one path per line, or None.",
        issue_block(issue),
        owner = repository.owner,
        name = repository.name,
    )
}

/// First proposal.
pub fn proposal(
    issue: &IssueContext,
    plan: &str,
    paths: &[FilePath],
    snapshot: &OriginalFileSnapshot,
) -> String {
    let targets = paths
        .iter()
        .map(|p| format!("- `{p}`"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\nPlan:\n{plan}\n\nTarget files:\n{targets}\n\n{}Propose the complete new content for each target file.",
        issue_block(issue),
        originals_block(paths, snapshot),
    )
}

/// Review of the working proposal.
pub fn review(issue: &IssueContext, plan: &str, working: &OperationSet) -> String {
    format!(
        "{}\nPlan:\n{plan}\n\nProposed changes:\n\n{}",
        issue_block(issue),
        working.render_markdown()
    )
}

/// Revision request carrying both reviewers' feedback.
pub fn revision(
    issue: &IssueContext,
    plan: &str,
    paths: &[FilePath],
    snapshot: &OriginalFileSnapshot,
    working: &OperationSet,
    verdicts: &[ReviewVerdict],
) -> String {
    let mut feedback = String::new();
    for verdict in verdicts {
        let _ = write!(feedback, "{}:\n{}\n\n", verdict.aspect.title(), verdict.feedback);
    }
    format!(
        "{}\nPlan:\n{plan}\n\n{}Your previous proposal was:\n\n{}\n\nIt received this feedback:\n\n{feedback}\
         Revise the proposal to address the feedback. Restate every target file.",
        issue_block(issue),
        originals_block(paths, snapshot),
        working.render_markdown(),
    )
}

/// Branch creation.
pub fn create_branch(
    repository: &RepositoryRef,
    issue: &IssueContext,
    base: &BranchName,
    prefix: BranchPrefix,
) -> String {
    format!(
        "Ensure the branch for issue {number} exists.\nRepository owner: {owner}\nRepository name: {name}\n\
         Issue number: {number}\nBase branch: {base}\nBranch prefix: {prefix}",
        number = issue.number.as_u64(),
        owner = repository.owner,
        name = repository.name,
        prefix = prefix.as_str(),
    )
}

/// Commit instructions. Deletes are listed first, then the upsert batch as
/// the literal `file_changes_list` argument.
pub fn commit(
    repository: &RepositoryRef,
    branch: &BranchName,
    base_message: &str,
    plan: &CommitPlan,
) -> String {
    let mut out = format!(
        "Repository owner: {owner}\nRepository name: {name}\nBranch: {branch}\nCommit message: {base_message}\n\n",
        owner = repository.owner,
        name = repository.name,
    );
    if plan.deletes.is_empty() {
        out.push_str("Files to delete: none\n\n");
    } else {
        out.push_str("Files to delete (call delete_file for each, in order):\n");
        for path in &plan.deletes {
            let _ = writeln!(out, "- {path}");
        }
        out.push('\n');
    }
    if plan.upserts.is_empty() {
        out.push_str("Files to create or update: none\n");
    } else {
        let list = json!(plan.upserts);
        let _ = write!(
            out,
            "Files to create or update (pass this exact list as file_changes_list in a single \
             commit_files_to_branch call):\n{}\n",
            serde_json::to_string_pretty(&list).unwrap_or_else(|_| list.to_string())
        );
    }
    out
}

/// Explanation of one committed change.
pub fn explain(
    issue: &IssueContext,
    plan: &str,
    operation: &FileOperation,
    original: &str,
) -> String {
    format!(
        "{}\nPlan:\n{plan}\n\nFile: `{path}` ({action})\n\nOriginal content:\n```\n{original}\n```\n\n\
         Proposed content:\n```\n{proposed}\n```\n\nExplain this change.",
        issue_block(issue),
        path = operation.file_path,
        action = operation.action.label(),
        proposed = proposed_text(operation),
    )
}

/// Comment posting.
pub fn post_comment(issue_url: &str, body: &str) -> String {
    format!(
        "Post the following comment to the GitHub issue at {issue_url}.\n\
         --- BEGIN COMMENT ---\n{body}\n--- END COMMENT ---"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{FileChange, FileOperation, IssueNumber};
    use std::collections::BTreeSet;

    fn issue() -> IssueContext {
        IssueContext {
            number: IssueNumber::new(12),
            title: "Fix typo".into(),
            body: "There is a typo.".into(),
            labels: BTreeSet::from(["bug".to_string()]),
            url: "https://github.com/o/r/issues/12".into(),
        }
    }

    #[test]
    fn commit_prompt_lists_deletes_before_the_batch() {
        let plan = CommitPlan {
            deletes: vec![FilePath::new("old.txt").unwrap()],
            upserts: vec![FileChange {
                file_path: FilePath::new("src/a.rs").unwrap(),
                file_content: "fn a() {}".into(),
            }],
        };
        let prompt = commit(
            &RepositoryRef::new("o", "r").unwrap(),
            &BranchName::new("fix/issue-12").unwrap(),
            "Propose solution for issue #12: Fix typo",
            &plan,
        );
        let delete_at = prompt.find("- old.txt").unwrap();
        let batch_at = prompt.find("\"file_path\": \"src/a.rs\"").unwrap();
        assert!(delete_at < batch_at);
        assert!(prompt.contains("\"file_content\": \"fn a() {}\""));
    }

    #[test]
    fn review_prompt_embeds_the_rendered_proposal() {
        let working: OperationSet =
            vec![FileOperation::modify(FilePath::new("a.txt").unwrap(), "new")].into_iter().collect();
        let prompt = review(&issue(), "1. Fix", &working);
        assert!(prompt.contains("Changes for `a.txt`:"));
        assert!(prompt.contains("Labels: bug"));
    }

    #[test]
    fn branch_prompt_uses_the_bare_issue_number() {
        let prompt = create_branch(
            &RepositoryRef::new("o", "r").unwrap(),
            &issue(),
            &BranchName::new("main").unwrap(),
            BranchPrefix::Fix,
        );
        assert!(prompt.contains("Issue number: 12\n"));
        assert!(prompt.contains("Branch prefix: fix"));
    }
}
