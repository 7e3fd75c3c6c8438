use super::code::language_for;
use super::walk::{extension, read_lossy};
use crate::models::SecurityFinding;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Scanning stops after this many source files.
const MAX_SCANNED_FILES: usize = 15_000;
/// Known-language extensions that hold config or prose rather than code.
static NON_CODE_EXTS: &[&str] = &[".json", ".yaml", ".yml", ".toml", ".md"];
const POINTS_PER_FINDING: f64 = 10.0;

/// Heuristic patterns, checked in this order.
static PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        (
            "hardcoded_secret",
            r#"(?i)(api[_-]?key|secret[_-]?key|password|token)\s*[=:]\s*["'][A-Za-z0-9+/=_-]{20,}"#,
        ),
        ("unsafe_eval", r"\b(eval|exec)\s*\("),
        ("shell_true", r"subprocess\.\w+\([^)]*shell\s*=\s*True"),
        (
            "debug_left",
            r"\b(?:pdb\.set_trace\b|breakpoint\(\)|debugger\b)",
        ),
    ]
    .into_iter()
    .map(|(name, pat)| (name, Regex::new(pat).expect("valid security pattern")))
    .collect()
});

fn is_scanned(path: &Path) -> bool {
    let ext = extension(path);
    language_for(&ext).is_some() && !NON_CODE_EXTS.contains(&ext.as_str())
}

/// First match of each pattern in `content`, as (pattern, 1-based line).
fn scan_content(content: &str) -> Vec<(&'static str, usize)> {
    PATTERNS
        .iter()
        .filter_map(|(name, re)| {
            re.find(content).map(|m| {
                let line = content[..m.start()].matches('\n').count() + 1;
                (*name, line)
            })
        })
        .collect()
}

/// Regex scan of source files. Each pattern yields at most one finding per
/// file, so a file can cost at most one finding per pattern.
pub fn scan_files(repo: &Path, files: &[PathBuf]) -> Vec<SecurityFinding> {
    scan_limited(repo, files, MAX_SCANNED_FILES)
}

fn scan_limited(repo: &Path, files: &[PathBuf], max_files: usize) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();
    for path in files.iter().filter(|p| is_scanned(p)).take(max_files) {
        let Some(content) = read_lossy(path) else {
            continue;
        };
        let rel = path
            .strip_prefix(repo)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        for (kind, line) in scan_content(&content) {
            findings.push(SecurityFinding {
                kind: kind.to_string(),
                file: rel.clone(),
                line,
            });
        }
    }
    findings
}

/// `100 - 10 × findings`, floored at zero.
pub fn security_score(findings: &[SecurityFinding]) -> f64 {
    (100.0 - findings.len() as f64 * POINTS_PER_FINDING).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::walk::{repo_files, MAX_FILES_PER_REPO};
    use std::fs;

    fn scan_dir(root: &Path) -> Vec<SecurityFinding> {
        scan_files(root, &repo_files(root, MAX_FILES_PER_REPO))
    }

    #[test]
    fn one_finding_per_pattern_per_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("app.py"),
            "x = 1\neval(a)\neval(b)\nexec(c)\n",
        )
        .unwrap();
        let findings = scan_dir(tmp.path());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, "unsafe_eval");
        assert_eq!(findings[0].file, "app.py");
        assert_eq!(findings[0].line, 2);
        assert_eq!(security_score(&findings), 90.0);
    }

    #[test]
    fn distinct_patterns_each_count() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("run.py"),
            "import subprocess\nsubprocess.run(cmd, shell=True)\nimport pdb; pdb.set_trace()\n",
        )
        .unwrap();
        let findings = scan_dir(tmp.path());
        let kinds: Vec<&str> = findings.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["shell_true", "debug_left"]);
        assert_eq!(security_score(&findings), 80.0);
    }

    #[test]
    fn detects_hardcoded_secret() {
        let hits = scan_content(r#"API_KEY = "abcdefghijklmnopqrstuvwxyz012345""#);
        assert_eq!(hits, vec![("hardcoded_secret", 1)]);
        assert!(scan_content(r#"password = "short""#).is_empty());
    }

    #[test]
    fn breakpoint_call_is_flagged() {
        assert_eq!(scan_content("def f():\n    breakpoint()\n"), vec![("debug_left", 2)]);
    }

    #[test]
    fn config_and_docs_are_not_scanned() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("README.md"), "never call eval(x)\n").unwrap();
        fs::write(tmp.path().join("conf.yaml"), "cmd: exec(x)\n").unwrap();
        assert!(scan_dir(tmp.path()).is_empty());
    }

    #[test]
    fn score_clamps_at_zero() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..12 {
            fs::write(tmp.path().join(format!("m{}.js", i)), "eval(input)\n").unwrap();
        }
        let findings = scan_dir(tmp.path());
        assert_eq!(findings.len(), 12);
        assert_eq!(security_score(&findings), 0.0);
    }

    #[test]
    fn scan_stops_after_file_cap() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("notes.md"), "eval(x)\n").unwrap();
        for i in 0..5 {
            fs::write(tmp.path().join(format!("m{}.py", i)), "eval(x)\n").unwrap();
        }
        let files = repo_files(tmp.path(), MAX_FILES_PER_REPO);
        // Skipped formats do not use up the cap.
        let findings = scan_limited(tmp.path(), &files, 3);
        let scanned: Vec<&str> = findings.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(scanned, vec!["m0.py", "m1.py", "m2.py"]);
    }
}
