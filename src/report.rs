use crate::models::RepoSnapshot;
use std::fmt::Write;

fn grouped(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

/// Summary table of a scan, healthiest first, with a totals row.
pub fn render_table(repos: &[RepoSnapshot]) -> String {
    let mut out = String::new();
    if repos.is_empty() {
        out.push_str("No git repos found. Check root_dir in your config.\n");
        return out;
    }

    let mut sorted: Vec<&RepoSnapshot> = repos.iter().collect();
    sorted.sort_by(|a, b| {
        b.health_score
            .total_cmp(&a.health_score)
            .then_with(|| a.name.cmp(&b.name))
    });

    let name_w = repos
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(4)
        .max(4);
    let lang_w = repos
        .iter()
        .map(|r| or_dash(&r.primary_language).chars().count())
        .max()
        .unwrap_or(4)
        .max(4);

    let _ = writeln!(
        out,
        "{:<nw$}  {:<11}  {:>6}  {:>10}  {:>8}  {:>8}  {:<lw$}  {:>4}  {:>8}",
        "NAME",
        "STATUS",
        "HEALTH",
        "LOC",
        "FILES",
        "COMMITS",
        "LANG",
        "DEPS",
        "SECURITY",
        nw = name_w,
        lw = lang_w,
    );
    let width = name_w + lang_w + 79;
    let _ = writeln!(out, "{}", "─".repeat(width));

    let (mut loc, mut files, mut commits, mut deps) = (0, 0, 0, 0);
    for r in &sorted {
        loc += r.total_loc;
        files += r.total_files;
        commits += r.git.total_commits;
        deps += r.dep_count;
        let _ = writeln!(
            out,
            "{:<nw$}  {:<11}  {:>6.1}  {:>10}  {:>8}  {:>8}  {:<lw$}  {:>4}  {:>8.0}",
            r.name,
            r.status.label(),
            r.health_score,
            grouped(r.total_loc),
            grouped(r.total_files),
            grouped(r.git.total_commits),
            or_dash(&r.primary_language),
            r.dep_count,
            r.security_score,
            nw = name_w,
            lw = lang_w,
        );
    }

    let avg = sorted.iter().map(|r| r.health_score).sum::<f64>() / sorted.len() as f64;
    let _ = writeln!(out, "{}", "─".repeat(width));
    let _ = writeln!(
        out,
        "{:<nw$}  {:<11}  {:>6.1}  {:>10}  {:>8}  {:>8}  {:<lw$}  {:>4}",
        "TOTALS",
        "",
        avg,
        grouped(loc),
        grouped(files),
        grouped(commits),
        "",
        deps,
        nw = name_w,
        lw = lang_w,
    );
    out
}

/// Detailed single-repository report.
pub fn render_report(r: &RepoSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  |  Health {:.1}  |  Status: {}",
        r.name,
        r.health_score,
        r.status.label()
    );
    let _ = writeln!(out, "{}", r.path);

    let _ = writeln!(out, "\nCode");
    let _ = writeln!(out, "  Total LoC         {}", grouped(r.total_loc));
    let _ = writeln!(out, "  Total Files       {}", grouped(r.total_files));
    let _ = writeln!(out, "  Primary Language  {}", or_dash(&r.primary_language));
    let _ = writeln!(out, "  Dependencies      {}", r.dep_count);
    let _ = writeln!(out, "  Security Score    {:.0}%", r.security_score);

    if !r.languages.is_empty() {
        let mut langs: Vec<_> = r.languages.iter().collect();
        langs.sort_by(|a, b| b.1.lines.cmp(&a.1.lines).then_with(|| a.0.cmp(b.0)));
        let _ = writeln!(out, "\nLanguages");
        for (lang, stats) in langs.into_iter().take(12) {
            let _ = writeln!(
                out,
                "  {:<12} {:>6} files  {:>10} LoC",
                lang,
                stats.files,
                grouped(stats.lines)
            );
        }
    }

    let git = &r.git;
    if git.error.is_none() {
        let _ = writeln!(out, "\nGit");
        let _ = writeln!(out, "  Total Commits     {}", grouped(git.total_commits));
        let _ = writeln!(out, "  Commits (30 d)    {}", git.commits_30d);
        let _ = writeln!(out, "  Commits (90 d)    {}", git.commits_90d);
        let _ = writeln!(out, "  Contributors      {}", git.contributors);
        let _ = writeln!(out, "  Branches          {}", git.branches);
        let _ = writeln!(out, "  Tags              {}", git.tags);
        if let Some(author) = &git.last_commit_author {
            let _ = writeln!(
                out,
                "  Last Commit       {} - {}",
                author,
                git.last_commit_message.as_deref().unwrap_or("")
            );
            let _ = writeln!(
                out,
                "  Date              {}",
                git.last_commit_date.as_deref().unwrap_or("")
            );
        }
    }

    if !r.security_findings.is_empty() {
        let _ = writeln!(out, "\nSecurity Findings ({})", r.security_findings.len());
        for f in &r.security_findings {
            let _ = writeln!(out, "  [{}] {}:{}", f.kind, f.file, f.line);
        }
    }

    let _ = writeln!(out, "\nQuality Indicators");
    for (label, ok) in [
        ("README", r.has_readme),
        ("Tests", r.has_tests),
        ("CI/CD", r.has_ci),
        ("Docs", r.has_docs),
        ("Nix Flake", r.has_flake),
    ] {
        let _ = writeln!(out, "  {} {}", if ok { "✓" } else { "✗" }, label);
    }
    out
}
