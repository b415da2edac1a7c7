//! Human-readable run summary on stderr.

use console::style;

use ocrlayer_core::pipeline::{ProcessingMethod, RunReport, RunStatus};

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let bytes = bytes as f64;
    if bytes >= MB {
        format!("{:.1} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}

pub fn print(report: &RunReport) {
    let finished = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    match (&report.output, report.status) {
        (Some(output), RunStatus::Success) => eprintln!(
            "{} {} ({})",
            style("✓").green(),
            output.display(),
            report.method
        ),
        (Some(output), RunStatus::PartialFailure) => eprintln!(
            "{} {} ({}, some pages without text layer)",
            style("⚠").yellow(),
            output.display(),
            report.method
        ),
        (None, _) => eprintln!(
            "{} No output written for {}",
            style("✗").red(),
            report.input.display()
        ),
    }

    let analysis = &report.analysis;
    eprintln!(
        "{} Pages: {}, with existing text: {}, avg {:.0} chars/page",
        style("ℹ").blue(),
        analysis.total_pages,
        analysis.pages_with_text,
        analysis.average_chars_per_page
    );

    if report.method != ProcessingMethod::CopyExisting {
        eprintln!(
            "{} Words embedded: {}",
            style("ℹ").blue(),
            report.words_embedded()
        );
    }

    if report.output.is_some() {
        eprintln!(
            "{} Size: {} -> {} ({:+.1}%)",
            style("ℹ").blue(),
            format_size(report.input_size),
            format_size(report.output_size),
            report.size_change_percent()
        );
    }

    eprintln!(
        "{} Finished {} in {:.2}s",
        style("ℹ").blue(),
        finished,
        report.elapsed.as_secs_f64()
    );
}

/// Failed pages are always reported, even in quiet or JSON mode.
pub fn print_failures(report: &RunReport) {
    for failure in report.failures() {
        eprintln!("{} {}", style("✗").red(), failure);
    }
}
