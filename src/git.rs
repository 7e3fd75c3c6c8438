use crate::error::{MetricsError, Result};
use crate::models::{Contributor, GitMetrics};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const TIMEOUT: Duration = Duration::from_secs(15);
const TOP_CONTRIBUTORS: usize = 5;
const HASH_LEN: usize = 12;
const MESSAGE_LEN: usize = 120;

/// Run one git command in `repo_path`, returning stdout on success.
async fn run_git(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = tokio::time::timeout(
        TIMEOUT,
        Command::new("git")
            .args(args)
            .current_dir(repo_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| MetricsError::Timeout {
        args: args.join(" "),
        after: TIMEOUT,
    })?
    .map_err(|e| MetricsError::Git {
        args: args.join(" "),
        reason: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(MetricsError::Git {
            args: args.join(" "),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn git_count(repo_path: &Path, args: &[&str]) -> Result<usize> {
    let raw = run_git(repo_path, args).await?;
    raw.trim().parse::<usize>().map_err(|e| MetricsError::Git {
        args: args.join(" "),
        reason: e.to_string(),
    })
}

async fn git_line_count(repo_path: &Path, args: &[&str]) -> Result<usize> {
    let raw = run_git(repo_path, args).await?;
    Ok(non_empty_lines(&raw).count())
}

fn non_empty_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().filter(|l| !l.trim().is_empty())
}

/// The commit currently checked out, or an empty string on any failure.
pub async fn head_hash(repo_path: &Path) -> String {
    run_git(repo_path, &["rev-parse", "HEAD"])
        .await
        .map(|raw| raw.trim().to_string())
        .unwrap_or_default()
}

pub async fn total_commits(repo_path: &Path) -> Result<usize> {
    git_count(repo_path, &["rev-list", "--count", "HEAD"]).await
}

pub async fn commits_since(repo_path: &Path, days: u32) -> Result<usize> {
    let after = format!("--after={} days ago", days);
    git_count(repo_path, &["rev-list", "--count", &after, "HEAD"]).await
}

/// `git shortlog -sn` output; an explicit `HEAD` keeps it off stdin.
pub async fn shortlog(repo_path: &Path) -> Result<String> {
    run_git(repo_path, &["shortlog", "-sn", "--no-merges", "HEAD"]).await
}

pub async fn branch_count(repo_path: &Path) -> Result<usize> {
    git_line_count(repo_path, &["branch", "--list"]).await
}

pub async fn tag_count(repo_path: &Path) -> Result<usize> {
    git_line_count(repo_path, &["tag", "--list"]).await
}

/// Hash, author, date and subject of the most recent commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCommit {
    pub hash: String,
    pub author: String,
    pub date: String,
    pub message: String,
}

pub async fn last_commit(repo_path: &Path) -> Result<Option<LastCommit>> {
    let raw = run_git(repo_path, &["log", "-1", "--format=%H|%an|%ai|%s"]).await?;
    Ok(parse_last_commit(&raw))
}

fn parse_last_commit(raw: &str) -> Option<LastCommit> {
    let mut parts = raw.trim().splitn(4, '|');
    let hash = parts.next()?;
    let author = parts.next()?;
    let date = parts.next()?;
    let message = parts.next()?;
    Some(LastCommit {
        hash: hash.chars().take(HASH_LEN).collect(),
        author: author.to_string(),
        date: date.to_string(),
        message: message.chars().take(MESSAGE_LEN).collect(),
    })
}

/// Parse `shortlog -sn` lines (`   12\tName`) in their listed order.
fn parse_shortlog(raw: &str) -> Vec<Contributor> {
    non_empty_lines(raw)
        .filter_map(|line| {
            let line = line.trim();
            let split = line.find(char::is_whitespace)?;
            let commits = line[..split].parse::<usize>().ok()?;
            let name = line[split..].trim();
            if name.is_empty() {
                return None;
            }
            Some(Contributor {
                name: name.to_string(),
                commits,
            })
        })
        .collect()
}

/// Collect all git metrics for one repository.
///
/// Each field is probed independently; a failed or timed-out git call leaves
/// that field at its default instead of aborting the rest.
pub async fn collect_git_metrics(repo_path: &Path) -> GitMetrics {
    if !repo_path.join(".git").exists() {
        return GitMetrics::not_a_repo();
    }

    let (total, c30, c90, log, branches, tags, last) = tokio::join!(
        total_commits(repo_path),
        commits_since(repo_path, 30),
        commits_since(repo_path, 90),
        shortlog(repo_path),
        branch_count(repo_path),
        tag_count(repo_path),
        last_commit(repo_path),
    );

    let log = log.unwrap_or_default();
    let contributors = parse_shortlog(&log);
    let last = last.ok().flatten();

    GitMetrics {
        error: None,
        total_commits: total.unwrap_or(0),
        commits_30d: c30.unwrap_or(0),
        commits_90d: c90.unwrap_or(0),
        contributors: contributors.len(),
        branches: branches.unwrap_or(0),
        tags: tags.unwrap_or(0),
        last_commit_hash: last.as_ref().map(|l| l.hash.clone()),
        last_commit_author: last.as_ref().map(|l| l.author.clone()),
        last_commit_date: last.as_ref().map(|l| l.date.clone()),
        last_commit_message: last.map(|l| l.message),
        top_contributors: contributors.into_iter().take(TOP_CONTRIBUTORS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::process::Command as StdCommand;

    fn init_test_repo(base: &Path) -> PathBuf {
        let run = |args: &[&str]| {
            StdCommand::new("git")
                .args(args)
                .current_dir(base)
                .output()
                .unwrap()
        };
        run(&["init"]);
        run(&["config", "user.email", "test@test.com"]);
        run(&["config", "user.name", "Test"]);
        base.to_path_buf()
    }

    fn commit(base: &Path, file: &str, msg: &str) {
        std::fs::write(base.join(file), msg).unwrap();
        for args in [vec!["add", "."], vec!["commit", "-m", msg]] {
            StdCommand::new("git")
                .args(&args)
                .current_dir(base)
                .output()
                .unwrap();
        }
    }

    #[test]
    fn parses_shortlog_lines() {
        let raw = "    12\tAda Lovelace\n     3\tGrace Hopper\n\n";
        let parsed = parse_shortlog(raw);
        assert_eq!(
            parsed,
            vec![
                Contributor {
                    name: "Ada Lovelace".to_string(),
                    commits: 12
                },
                Contributor {
                    name: "Grace Hopper".to_string(),
                    commits: 3
                },
            ]
        );
    }

    #[test]
    fn parses_last_commit_and_truncates() {
        let long = "x".repeat(200);
        let raw = format!(
            "0123456789abcdef0123|Ada|2026-01-02 10:00:00 +0000|{}|with pipe\n",
            long
        );
        let last = parse_last_commit(&raw).unwrap();
        assert_eq!(last.hash, "0123456789ab");
        assert_eq!(last.author, "Ada");
        assert_eq!(last.message.chars().count(), MESSAGE_LEN);
        assert!(parse_last_commit("").is_none());
    }

    #[tokio::test]
    async fn test_not_a_repo_sets_error_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let metrics = collect_git_metrics(tmp.path()).await;
        assert_eq!(metrics.error.as_deref(), Some("not a git repo"));
        assert_eq!(metrics.total_commits, 0);
        assert_eq!(head_hash(tmp.path()).await, "");
    }

    #[tokio::test]
    async fn test_repo_without_commits_degrades_per_field() {
        let tmp = tempfile::tempdir().unwrap();
        let base = init_test_repo(tmp.path());
        let metrics = collect_git_metrics(&base).await;
        assert!(metrics.error.is_none());
        assert_eq!(metrics.total_commits, 0);
        assert_eq!(metrics.contributors, 0);
        assert!(metrics.last_commit_hash.is_none());
        assert_eq!(head_hash(&base).await, "");
    }

    #[tokio::test]
    async fn test_collects_history() {
        let tmp = tempfile::tempdir().unwrap();
        let base = init_test_repo(tmp.path());
        commit(&base, "a.txt", "first");
        commit(&base, "b.txt", "second");
        StdCommand::new("git")
            .args(["tag", "v1"])
            .current_dir(&base)
            .output()
            .unwrap();

        let metrics = collect_git_metrics(&base).await;
        assert_eq!(metrics.total_commits, 2);
        assert_eq!(metrics.commits_30d, 2);
        assert_eq!(metrics.commits_90d, 2);
        assert_eq!(metrics.contributors, 1);
        assert_eq!(metrics.branches, 1);
        assert_eq!(metrics.tags, 1);
        assert_eq!(metrics.last_commit_message.as_deref(), Some("second"));
        assert_eq!(metrics.top_contributors[0].commits, 2);

        let head = head_hash(&base).await;
        assert_eq!(head.len(), 40);
        assert!(head.starts_with(metrics.last_commit_hash.as_deref().unwrap()));
    }
}
