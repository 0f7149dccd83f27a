//! Response Formatting
//!
//! Turns daemon responses into terminal output, and dependency records into a
//! Graphviz file.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use hostaware_protocol::{EdgeRecord, EdgeState, Opt, Request, Response};

/// Lines to print for a successful `response` to `request`
pub fn format_response(request: &Request, response: &Response) -> Result<Vec<String>> {
    let subject = request.get(0).unwrap_or_default();
    let lines = match request.opt {
        Opt::Load => vec![format!(
            "Loaded {subject}, instances: {}",
            response.payload.join(", ")
        )],
        Opt::Remove => vec![format!("Removed {subject}")],
        Opt::Enable => vec![format!("Enabled {subject}")],
        Opt::Disable => vec![format!("Disabled {subject}")],
        Opt::Query | Opt::QueryAll => {
            if response.payload.is_empty() {
                vec!["No plugins loaded".to_string()]
            } else {
                response
                    .payload
                    .iter()
                    .map(|entry| entry.trim_end().to_string())
                    .collect()
            }
        }
        Opt::QueryDep | Opt::QueryAllDeps => parse_edges(response)?
            .iter()
            .map(|edge| format!("{} -> {} ({})", edge.from, edge.to, state_name(edge.state)))
            .collect(),
        Opt::List => format_list(&response.payload),
        Opt::Install => response
            .payload
            .iter()
            .map(|url| format!("Download {subject} from {url}"))
            .collect(),
        Opt::Reload => {
            let mut lines = vec!["Configuration reloaded".to_string()];
            lines.extend(response.payload.iter().cloned());
            lines
        }
    };
    Ok(lines)
}

pub fn parse_edges(response: &Response) -> Result<Vec<EdgeRecord>> {
    response
        .payload
        .iter()
        .map(|entry| {
            EdgeRecord::from_payload(entry)
                .with_context(|| format!("malformed dependency record: {entry}"))
        })
        .collect()
}

fn state_name(state: EdgeState) -> &'static str {
    match state {
        EdgeState::Resolved => "resolved",
        EdgeState::Unavailable => "unavailable",
        EdgeState::Missing => "missing",
    }
}

fn format_list(entries: &[String]) -> Vec<String> {
    let rows: Vec<Vec<&str>> = entries
        .iter()
        .map(|entry| entry.splitn(3, '\t').collect())
        .collect();
    let width = rows
        .iter()
        .filter_map(|row| row.first())
        .map(|name| name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut lines = vec![format!("{:<width$}  {:<9}  DESCRIPTION", "NAME", "STATUS")];
    for row in rows {
        let name = row.first().copied().unwrap_or_default();
        let status = row.get(1).copied().unwrap_or_default();
        let description = row.get(2).copied().unwrap_or_default();
        lines.push(
            format!("{name:<width$}  {status:<9}  {description}")
                .trim_end()
                .to_string(),
        );
    }
    lines
}

// ─────────────────────────────────────────────────────────────────────────────
// Graphviz Export
// ─────────────────────────────────────────────────────────────────────────────

/// Render edges as a Graphviz digraph
///
/// Edges to missing instances are dashed, edges to unavailable ones grey.
pub fn render_dot(edges: &[EdgeRecord]) -> String {
    let mut dot = String::from("digraph hostaware {\n    rankdir=LR;\n    node [shape=box];\n");
    for edge in edges {
        let style = match edge.state {
            EdgeState::Resolved => "",
            EdgeState::Unavailable => " [color=grey]",
            EdgeState::Missing => " [style=dashed]",
        };
        let _ = writeln!(dot, "    {:?} -> {:?}{};", edge.from, edge.to, style);
    }
    dot.push_str("}\n");
    dot
}

pub fn write_dot(path: &Path, edges: &[EdgeRecord]) -> Result<()> {
    std::fs::write(path, render_dot(edges))
        .with_context(|| format!("failed to write {}", path.display()))
}
