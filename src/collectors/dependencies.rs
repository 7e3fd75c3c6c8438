use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static CARGO_DEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([\w-]+)\s*=").expect("valid regex"));
static GO_REQUIRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w./\-]+)\s+v").expect("valid regex"));

/// Dependency names declared in the repository's manifests, each prefixed by
/// ecosystem (`py:`, `npm:`, `npm-dev:`, `cargo:`, `go:`).
///
/// A missing or unparsable manifest contributes nothing.
pub fn collect_dependencies(repo: &Path) -> Vec<String> {
    let mut deps = Vec::new();

    if let Some(text) = read(repo, "pyproject.toml") {
        deps.extend(poetry_deps(&text));
    }
    if let Some(text) = read(repo, "package.json") {
        deps.extend(npm_deps(&text));
    }
    if let Some(text) = read(repo, "Cargo.toml") {
        deps.extend(cargo_deps(&text));
    }
    if let Some(text) = read(repo, "go.mod") {
        deps.extend(go_deps(&text));
    }

    deps
}

fn read(repo: &Path, file: &str) -> Option<String> {
    fs::read_to_string(repo.join(file)).ok()
}

/// `[tool.poetry.dependencies]` minus the `python` constraint.
fn poetry_deps(text: &str) -> Vec<String> {
    let Ok(doc) = text.parse::<toml::Table>() else {
        return Vec::new();
    };
    doc.get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_table())
        .map(|table| {
            table
                .keys()
                .filter(|name| name.as_str() != "python")
                .map(|name| format!("py:{}", name))
                .collect()
        })
        .unwrap_or_default()
}

fn npm_deps(text: &str) -> Vec<String> {
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };
    let names = |key: &str, prefix: &str| -> Vec<String> {
        doc.get(key)
            .and_then(|d| d.as_object())
            .map(|obj| obj.keys().map(|k| format!("{}:{}", prefix, k)).collect())
            .unwrap_or_default()
    };
    let mut deps = names("dependencies", "npm");
    deps.extend(names("devDependencies", "npm-dev"));
    deps
}

/// Line scan of the `[dependencies]` table, up to the next `[section]`.
fn cargo_deps(text: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut in_deps = false;
    for line in text.lines() {
        let line = line.trim();
        if line == "[dependencies]" {
            in_deps = true;
            continue;
        }
        if !in_deps {
            continue;
        }
        if line.starts_with('[') {
            break;
        }
        if let Some(cap) = CARGO_DEP.captures(line) {
            deps.push(format!("cargo:{}", &cap[1]));
        }
    }
    deps
}

/// Line scan of `require (...)` blocks plus single-line `require` statements.
fn go_deps(text: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut in_require = false;
    for line in text.lines() {
        let line = line.trim();
        if in_require {
            if line == ")" {
                in_require = false;
            } else if let Some(cap) = GO_REQUIRE.captures(line) {
                deps.push(format!("go:{}", &cap[1]));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("require") {
            let rest = rest.trim();
            if rest.starts_with('(') {
                in_require = true;
            } else if let Some(cap) = GO_REQUIRE.captures(rest) {
                deps.push(format!("go:{}", &cap[1]));
            }
        }
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_json_namespaces_dev_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("package.json"),
            r#"{"dependencies":{"react":"^18"},"devDependencies":{"vite":"^5"}}"#,
        )
        .unwrap();
        let deps = collect_dependencies(tmp.path());
        assert_eq!(deps, vec!["npm:react", "npm-dev:vite"]);
    }

    #[test]
    fn poetry_skips_python() {
        let text = r#"
[tool.poetry]
name = "demo"

[tool.poetry.dependencies]
python = "^3.11"
requests = "^2.31"
typer = { version = "^0.9", extras = ["all"] }
"#;
        assert_eq!(poetry_deps(text), vec!["py:requests", "py:typer"]);
    }

    #[test]
    fn cargo_stops_at_next_section() {
        let text = r#"
[package]
name = "demo"

[dependencies]
serde = { version = "1", features = ["derive"] }
tokio-util = "0.7"
# comment

[dev-dependencies]
tempfile = "3"
"#;
        assert_eq!(cargo_deps(text), vec!["cargo:serde", "cargo:tokio-util"]);
    }

    #[test]
    fn go_mod_block_and_single_line() {
        let text = r#"module example.com/demo

go 1.22

require github.com/pkg/errors v0.9.1

require (
	github.com/spf13/cobra v1.8.0
	golang.org/x/sync v0.6.0 // indirect
)
"#;
        assert_eq!(
            go_deps(text),
            vec![
                "go:github.com/pkg/errors",
                "go:github.com/spf13/cobra",
                "go:golang.org/x/sync",
            ]
        );
    }

    #[test]
    fn broken_manifests_contribute_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("package.json"), "{ not json").unwrap();
        fs::write(tmp.path().join("pyproject.toml"), "[[[").unwrap();
        assert!(collect_dependencies(tmp.path()).is_empty());
    }

    #[test]
    fn no_manifests_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(collect_dependencies(tmp.path()).is_empty());
    }
}
