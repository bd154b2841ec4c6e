//! Markdown report generation
//!
//! Writes a human-readable report of a mirror run: counts, the pages that
//! were mirrored with their titles, and every failure with its reason.

use crate::output::stats::format_bytes;
use crate::output::MirrorSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report of a run to `output_path`
pub fn write_markdown_report(summary: &MirrorSummary, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_report(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_report(summary: &MirrorSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Mirror Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Site**: {}\n", summary.seed_url));
    md.push_str(&format!("- **Output**: {}\n", summary.output_dir.display()));
    md.push_str(&format!("- **Max Depth**: {}\n", summary.max_depth));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    if let Some(finished) = summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = summary.duration_seconds() {
        md.push_str(&format!("- **Duration**: {:.1} seconds\n", duration));
    }
    let status = if summary.cancelled { "cancelled" } else { "completed" };
    md.push_str(&format!("- **Status**: {}\n\n", status));

    // Counts
    md.push_str("## Resources\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Fetched | {} |\n", summary.fetched));
    md.push_str(&format!("| Skipped | {} |\n", summary.skipped));
    md.push_str(&format!("| Failed | {} |\n\n", summary.failed));
    md.push_str(&format!(
        "- **Downloaded**: {}\n",
        format_bytes(summary.bytes_downloaded)
    ));
    md.push_str(&format!(
        "- **Documents Rewritten**: {}\n",
        summary.documents_rewritten
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    if !summary.pages.is_empty() {
        md.push_str("## Pages\n\n");
        md.push_str("| Depth | Title | URL | Local Path |\n");
        md.push_str("|-------|-------|-----|------------|\n");

        let mut pages: Vec<_> = summary.pages.iter().collect();
        pages.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));

        for page in pages {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                page.depth,
                escape_cell(page.title.as_deref().unwrap_or("-")),
                page.url,
                page.local_path.display()
            ));
        }
        md.push('\n');
    }

    if !summary.failures.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| URL | Reason |\n");
        md.push_str("|-----|--------|\n");

        for failure in &summary.failures {
            md.push_str(&format!(
                "| {} | {} |\n",
                failure.url,
                escape_cell(&failure.reason.to_string())
            ));
        }
        md.push('\n');
    }

    if !summary.degraded_pages.is_empty() {
        md.push_str("## Partially Parsed Pages\n\n");
        for url in &summary.degraded_pages {
            md.push_str(&format!("- {}\n", url));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
