// Human-readable output for reports

use colored::Colorize;
use provgraph_core::{
    CheckResult, CheckStatus, GraphValidation, LinkVerification, Manifest, ManifestId,
    ValidationReport,
};

use crate::formats::EnvelopeCheck;

fn marker(status: CheckStatus) -> colored::ColoredString {
    match status {
        CheckStatus::Pass => "✓".green().bold(),
        CheckStatus::Fail => "✗".red().bold(),
        CheckStatus::Unavailable => "?".yellow().bold(),
        CheckStatus::Skipped => "-".dimmed(),
    }
}

fn check_line(check: &CheckResult) -> String {
    let label = serde_json::to_value(check.check)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut line = format!("  {} {:<16} {}", marker(check.status), label, check.subject);
    if check.status != CheckStatus::Pass {
        line.push_str(&format!(" [{:?}]", check.reason));
    }
    if let Some(detail) = &check.detail {
        line.push_str(&format!(" {}", detail.dimmed()));
    }
    line
}

pub fn report(report: &ValidationReport) {
    println!("{}", report.manifest_id);
    for check in &report.checks {
        println!("{}", check_line(check));
    }
    if report.passed() {
        println!("{} {}", "✓".green().bold(), "Validation passed".green());
    } else {
        println!(
            "{} {}",
            "✗".red().bold(),
            format!("Validation failed ({} findings)", report.failures().count()).red()
        );
    }
}

pub fn graph_validation(outcome: &GraphValidation) {
    for manifest_report in outcome.reports.values() {
        report(manifest_report);
        println!();
    }
    if !outcome.graph.unresolved.is_empty() {
        println!("{}", "Unresolved links:".yellow());
        for id in &outcome.graph.unresolved {
            println!("  {}", id);
        }
    }
    if outcome.graph.truncated {
        println!("{}", "Depth limit reached; some manifests were not validated".yellow());
    }
    let failed = outcome.reports.values().filter(|r| !r.passed()).count();
    if failed == 0 {
        println!(
            "{} {}",
            "✓".green().bold(),
            format!("All {} manifests passed", outcome.reports.len()).green()
        );
    } else {
        println!(
            "{} {}",
            "✗".red().bold(),
            format!("{} of {} manifests failed", failed, outcome.reports.len()).red()
        );
    }
}

pub fn link_verification(source: &ManifestId, target: &ManifestId, outcome: &LinkVerification) {
    if outcome.valid {
        println!("{} {} links to {}", "✓".green().bold(), source, target);
    } else {
        println!(
            "{} {} -> {}: {:?}",
            "✗".red().bold(),
            source,
            target,
            outcome.reason
        );
    }
}

pub fn history(versions: &[Manifest]) {
    let total = versions.len();
    for (i, manifest) in versions.iter().enumerate() {
        let tag = if i == 0 {
            "latest".green().to_string()
        } else {
            format!("v{}", total - i).dimmed().to_string()
        };
        println!(
            "{} {} {} links={}{}",
            tag,
            manifest.id,
            manifest.claim.created_at.to_rfc3339(),
            manifest.claim.linked_manifests.len(),
            if manifest.signature.is_some() { " signed" } else { "" }
        );
    }
}

pub fn envelope(check: &EnvelopeCheck) {
    println!("{}", check.id);
    for signer in &check.signers {
        let mark = if check.untrusted.contains(signer) {
            "✗".red().bold()
        } else {
            "✓".green().bold()
        };
        println!("  {} signer {}", mark, signer);
    }
    match (check.valid, check.failure) {
        (true, _) => println!("{} {}", "✓".green().bold(), "Envelope verified".green()),
        (false, Some(failure)) => println!("{} {}", "✗".red().bold(), failure.to_string().red()),
        (false, None) => println!("{} {}", "✗".red().bold(), "Signer not trusted".red()),
    }
}
