use std::sync::Arc;

use client_core::{Banner, ViewSnapshot};
use shared::domain::{BannerKind, Row};

const MAX_CELL_WIDTH: usize = 32;

/// Plain-text table over the union of row fields, in first-seen order.
pub fn format_table(rows: &[Arc<Row>]) -> String {
    if rows.is_empty() {
        return "(no rows)\n".to_string();
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for name in row.fields().keys() {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| clip(&row.text(c))).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|line| line[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut out = String::new();
    push_line(&mut out, columns.iter().map(|c| c.to_string()), &widths);
    push_line(&mut out, widths.iter().map(|w| "-".repeat(*w)), &widths);
    for line in cells {
        push_line(&mut out, line.into_iter(), &widths);
    }
    out
}

fn push_line(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_WIDTH {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
    clipped.push('…');
    clipped
}

pub fn format_banner(banner: &Banner) -> String {
    let tag = match banner.kind {
        BannerKind::Error => "error",
        BannerKind::Success => "ok",
    };
    format!("[{tag}] {}", banner.message)
}

pub fn print_banners(snapshot: &ViewSnapshot) {
    for banner in [&snapshot.success, &snapshot.error].into_iter().flatten() {
        println!("{}", format_banner(banner));
    }
}
