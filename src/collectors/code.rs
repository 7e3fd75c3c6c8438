use super::walk::{extension, read_lossy};
use crate::models::LanguageStats;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Known languages and the extensions that identify them.
pub static LANGUAGES: &[(&str, &[&str])] = &[
    ("Python", &[".py"]),
    ("Rust", &[".rs"]),
    ("TypeScript", &[".ts", ".tsx"]),
    ("JavaScript", &[".js", ".jsx", ".mjs"]),
    ("Nix", &[".nix"]),
    ("Go", &[".go"]),
    ("Solidity", &[".sol"]),
    ("Shell", &[".sh"]),
    ("YAML", &[".yaml", ".yml"]),
    ("TOML", &[".toml"]),
    ("JSON", &[".json"]),
    ("Markdown", &[".md"]),
    ("CSS", &[".css"]),
    ("HTML", &[".html"]),
    ("C", &[".c", ".h"]),
    ("C++", &[".cpp", ".hpp", ".cc", ".hh"]),
    ("Java", &[".java"]),
    ("Zig", &[".zig"]),
    ("Svelte", &[".svelte"]),
];

pub fn language_for(ext: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(_, exts)| exts.contains(&ext))
        .map(|(lang, _)| *lang)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeMetrics {
    pub total_files: usize,
    pub total_loc: usize,
    pub languages: BTreeMap<String, LanguageStats>,
    pub primary_language: String,
}

/// Count files and lines per language over an already-walked file list.
/// Every walked file counts toward `total_files`; only recognised ones are read.
pub fn code_metrics(files: &[PathBuf]) -> CodeMetrics {
    let mut metrics = CodeMetrics {
        total_files: files.len(),
        ..CodeMetrics::default()
    };

    for path in files {
        let Some(lang) = language_for(&extension(path)) else {
            continue;
        };
        let stats = metrics.languages.entry(lang.to_string()).or_default();
        stats.files += 1;
        if let Some(text) = read_lossy(path) {
            let lines = text.lines().count();
            stats.lines += lines;
            metrics.total_loc += lines;
        }
    }

    metrics.primary_language = primary_language(&metrics.languages);
    metrics
}

/// Language with the most lines. Ties go to the alphabetically first name.
fn primary_language(languages: &BTreeMap<String, LanguageStats>) -> String {
    let mut best: Option<(&String, usize)> = None;
    for (lang, stats) in languages {
        if best.map_or(true, |(_, lines)| stats.lines > lines) {
            best = Some((lang, stats.lines));
        }
    }
    best.map(|(lang, _)| lang.clone()).unwrap_or_default()
}
