use std::{
    future::Future,
    path::PathBuf,
    sync::LazyLock,
};

use regex::Regex;
use task_ledger::TaskKind;
use uuid::Uuid;

use crate::error::PulseError;

static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").expect("valid heading regex"));

/// Everything the exporter needs to write one artifact.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub task_id: String,
    pub kind: TaskKind,
    pub source: String,
    pub label: Option<String>,
    pub summary: String,
}

impl ExportRequest {
    fn title(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.source)
    }
}

/// Writes a finished summary somewhere and returns its location.
pub trait Exporter {
    type Error: std::fmt::Display + Send;

    fn export(
        &self,
        request: ExportRequest,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Renders the summary as a standalone markdown document (YAML front matter,
/// an overview of the task, the summary body) and writes it into the output
/// directory.
#[derive(Debug, Clone)]
pub struct MarkdownExporter {
    output_dir: PathBuf,
    with_toc: bool,
}

impl MarkdownExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        MarkdownExporter {
            output_dir: output_dir.into(),
            with_toc: false,
        }
    }

    /// Prepends a table of contents built from the summary's headings.
    pub fn with_toc(mut self) -> Self {
        self.with_toc = true;
        self
    }

    fn render(&self, request: &ExportRequest) -> String {
        let title = request.title();
        let kind = match request.kind {
            TaskKind::File => "file",
            TaskKind::Url => "url",
        };
        let now = chrono::Utc::now();

        let mut doc = String::new();
        doc.push_str("---\n");
        doc.push_str(&format!("title: \"{}\"\n", title.replace('"', "\\\"")));
        doc.push_str(&format!("source: \"{}\"\n", request.source.replace('"', "\\\"")));
        doc.push_str(&format!("kind: {kind}\n"));
        doc.push_str(&format!("processed_at: {}\n", now.to_rfc3339()));
        doc.push_str("---\n\n");

        doc.push_str(&format!("# {title}\n\n"));

        doc.push_str("## Overview\n\n");
        doc.push_str(&format!("- **Source**: {}\n", request.source));
        doc.push_str(&format!("- **Kind**: {kind}\n"));
        if let Some(label) = &request.label {
            doc.push_str(&format!("- **Label**: {label}\n"));
        }
        doc.push_str(&format!(
            "- **Processed at**: {}\n",
            now.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        doc.push_str("\n---\n\n");

        if self.with_toc {
            let toc = table_of_contents(&request.summary);
            if !toc.is_empty() {
                doc.push_str("## Contents\n\n");
                doc.push_str(&toc);
                doc.push('\n');
            }
        }

        doc.push_str("## Summary\n\n");
        doc.push_str(request.summary.trim());
        doc.push_str("\n\n---\n\n");
        doc.push_str("*Generated by summary-pulse*\n");
        doc
    }

    fn artifact_path(&self, request: &ExportRequest) -> PathBuf {
        let stem = sanitize_filename(request.title());
        let unique = Uuid::new_v4().simple().to_string();
        self.output_dir
            .join(format!("{stem}_{}.md", &unique[..8]))
    }
}

impl Exporter for MarkdownExporter {
    type Error = PulseError;

    async fn export(&self, request: ExportRequest) -> Result<String, PulseError> {
        let path = self.artifact_path(&request);
        let document = self.render(&request);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to create output directory"))?;
        tokio::fs::write(&path, document)
            .await
            .inspect_err(|e| tracing::error!(error = %e, path = %path.display(), "Failed to write summary"))?;

        tracing::info!(task_id = %request.task_id, path = %path.display(), "Wrote summary artifact");
        Ok(path.display().to_string())
    }
}

/// Replaces filesystem-hostile characters and trims the result so a task
/// label is always usable as a file stem.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "summary".to_string()
    } else {
        trimmed.chars().take(120).collect()
    }
}

/// Builds a nested markdown list linking to every heading in `body`.
fn table_of_contents(body: &str) -> String {
    let mut toc = String::new();
    for capture in HEADING_REGEX.captures_iter(body) {
        let depth = capture[1].len();
        let heading = capture[2].trim();
        let indent = "  ".repeat(depth.saturating_sub(1));
        toc.push_str(&format!("{indent}- [{heading}](#{})\n", anchor(heading)));
    }
    toc
}

fn anchor(heading: &str) -> String {
    heading
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}
