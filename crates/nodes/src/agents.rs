//! Role agent definitions.
//!
//! Each role is a [`RoleAgent`]: a name, a system instruction, and the
//! capabilities it may call. Roles are plain values built once per executor;
//! the [`AgentRuntime`](pipeline::AgentRuntime) does the invoking.

use pipeline::{ModelId, ReviewAspect, RoleAgent};

use crate::tools::Toolbox;

const TRIAGER_INSTRUCTIONS: &str = "\
You triage GitHub issues. Call the download_github_issue tool with the issue URL you are given, \
then write a detailed summary covering the title, URL, author, state, labels, comment count, \
creation and update dates, and a concise description of the problem. Classify the issue \
(bug, feature, documentation, chore) and suggest a priority of Low, Medium or High with a \
one-sentence justification.";

const PLANNER_INSTRUCTIONS: &str = "\
You are an experienced software project planner. From the issue details and triage summary you \
are given, write a concise, actionable plan for resolving the issue. Keep it high level: which \
files are likely involved, what has to change in each, and how the result should be checked. \
Output the plan as a numbered list and nothing else.";

const FILE_IDENTIFIER_INSTRUCTIONS: &str = "\
You are a software architect deciding which files must change to resolve a GitHub issue. Use the \
list_repository_files tool to see the repository layout, and get_file_content when a file's \
contents decide whether it is relevant. Files that do not exist yet may be listed if the plan \
needs them created. Output ONLY repository-relative file paths, one per line, with no commentary. \
If no file needs to change, output exactly: None";

const PROPOSER_INSTRUCTIONS: &str = "\
You are an expert software developer proposing complete file contents that resolve a GitHub issue. \
For every target file, emit exactly one of these forms:\n\
\n\
Changes for `path/to/file.ext`:\n\
```language\n\
<the complete new content of the file>\n\
```\n\
\n\
Delete file `path/to/file.ext`\n\
\n\
No changes needed for `path/to/file.ext`.\n\
\n\
Always give the whole file, never a diff or an excerpt. Use one fenced block per changed file and \
put nothing else inside it. When you are revising a previous proposal, say so, address every \
reviewer comment, and restate every file using the forms above.";

const BRANCH_CREATOR_INSTRUCTIONS: &str = "\
You are a Git assistant. Ensure the working branch for a GitHub issue exists by calling the \
create_pr_branch tool exactly once with the repository, issue number, base branch and branch \
prefix you are given. Then state whether the branch was created, already existed, or could not \
be created, quoting the branch name from the tool result.";

const COMMITTER_INSTRUCTIONS: &str = "\
You are a Git assistant committing prepared changes to a branch. First call delete_file once for \
each file listed for deletion, in the order given. Then, if any files are listed for creation or \
update, call commit_files_to_branch exactly once with all of them, unchanged and in the order \
given. Never edit file contents. Finish with a short summary of each file's result.";

const EXPLAINER_INSTRUCTIONS: &str = "\
You explain code changes to the people following a GitHub issue. Given the issue, the plan, a \
file's original content and its proposed content, write two to five sentences of plain markdown \
describing what changed in that file and how it helps resolve the issue. Do not repeat the code.";

const COMMENT_POSTER_INSTRUCTIONS: &str = "\
You post comments to GitHub issues. Call the post_comment_to_github tool exactly once with the \
issue URL and the comment body you are given, passing the body through verbatim. Then report \
whether the comment was posted.";

fn reviewer_instructions(aspect: ReviewAspect) -> String {
    let keywords = aspect
        .approval_keywords()
        .iter()
        .map(|k| format!("'{k}'"))
        .collect::<Vec<_>>()
        .join(" or ");
    format!(
        "You are a meticulous code reviewer specialising in {focus}. You are given a GitHub issue, \
         the resolution plan, and proposed content for one or more files. Review every file for \
         {focus}, for whether the change actually resolves the issue, and for bugs or missed edge \
         cases. If every proposed file is acceptable, reply with only {keywords}. Otherwise start \
         your reply with 'Needs revision.' and then, file by file, list the exact changes required.",
        focus = aspect.focus(),
    )
}

/// Every role the executor invokes.
#[derive(Clone, Debug)]
pub struct RoleSet {
    /// Fetches and summarises the issue.
    pub triager: RoleAgent,
    /// Writes the numbered plan.
    pub planner: RoleAgent,
    /// Names the files to change.
    pub file_identifier: RoleAgent,
    /// Proposes and revises file contents.
    pub proposer: RoleAgent,
    /// Reviews for correctness.
    pub technical_reviewer: RoleAgent,
    /// Reviews for readability.
    pub style_reviewer: RoleAgent,
    /// Ensures the working branch exists.
    pub branch_creator: RoleAgent,
    /// Applies deletes and the upsert batch.
    pub committer: RoleAgent,
    /// Describes one committed change.
    pub change_explainer: RoleAgent,
    /// Posts the final report.
    pub comment_poster: RoleAgent,
}

impl RoleSet {
    /// Builds every role on `model`, binding capabilities from `tools`.
    pub fn new(tools: &Toolbox, model: &ModelId) -> Self {
        let role = |name: &str, instructions: &str| {
            RoleAgent::new(name, instructions, model.clone())
        };
        Self {
            triager: role("IssueTriager", TRIAGER_INSTRUCTIONS)
                .with_capability(tools.download_issue.clone()),
            planner: role("Planner", PLANNER_INSTRUCTIONS),
            file_identifier: role("FileIdentifier", FILE_IDENTIFIER_INSTRUCTIONS)
                .with_capability(tools.list_files.clone())
                .with_capability(tools.get_file_content.clone()),
            proposer: role("CodeProposer", PROPOSER_INSTRUCTIONS),
            technical_reviewer: role(
                "TechnicalReviewer",
                &reviewer_instructions(ReviewAspect::Technical),
            ),
            style_reviewer: role("StyleReviewer", &reviewer_instructions(ReviewAspect::Style)),
            branch_creator: role("BranchCreator", BRANCH_CREATOR_INSTRUCTIONS)
                .with_capability(tools.create_branch.clone()),
            committer: role("CodeCommitter", COMMITTER_INSTRUCTIONS)
                .with_capability(tools.delete_file.clone())
                .with_capability(tools.commit_files.clone()),
            change_explainer: role("ChangeExplainer", EXPLAINER_INSTRUCTIONS),
            comment_poster: role("CommentPoster", COMMENT_POSTER_INSTRUCTIONS)
                .with_capability(tools.post_comment.clone()),
        }
    }

    /// The reviewer for `aspect`.
    pub fn reviewer(&self, aspect: ReviewAspect) -> &RoleAgent {
        match aspect {
            ReviewAspect::Technical => &self.technical_reviewer,
            ReviewAspect::Style => &self.style_reviewer,
        }
    }
}
