//! Terminal table
//!
//! Renders a [`TableSnapshot`] as the fixed-width box a node prints to its
//! terminal face. Every line between the borders is exactly [`WIDTH`]
//! characters, so consecutive renders overwrite each other cleanly on a
//! scrolling serial console.

use std::fmt::Write;

use pi_mesh_core::round::Phase;
use pi_mesh_core::snapshot::{RowSnapshot, TableSnapshot};

/// Inner width of the table
pub const WIDTH: usize = 70;

/// Blank lines printed ahead of the table to push the previous one away
const SCROLL: usize = 12;

/// Render `snapshot`, printing estimates with `precision` decimals
pub fn render_table(snapshot: &TableSnapshot, precision: u32) -> String {
    let mut out = String::new();
    out.push_str(&"\n".repeat(SCROLL));

    border(&mut out, '=');
    let doa = if snapshot.phase == Phase::Idle {
        "--".to_string()
    } else {
        format!("{:.3}%", snapshot.target.percent())
    };
    line(
        &mut out,
        format!("DOA: {:<24}HOST TIME: {:010}", doa, snapshot.taken_at),
    );
    border(&mut out, '-');

    line(
        &mut out,
        format!(
            "{:<9}{:>6}{:>15}{:>9}{:>10}{:>10}{:>11}",
            "ID", "ACTIVE", "TIME-STAMP", "SEQ", "PINGS", "ROUND", "RESULT"
        ),
    );
    line(
        &mut out,
        format!(
            "{:<9}{:>6}{:>15}{:>9}{:>10}{:>10}{:>11}",
            "----", "------", "----------", "----", "-----", "-----", "------"
        ),
    );
    for row in &snapshot.rows {
        line(&mut out, render_row(row));
    }
    border(&mut out, '-');

    if snapshot.phase == Phase::Idle {
        line(&mut out, format!("PI ESTIMATE: {:<19}RUN TIME: --", "--"));
    } else {
        line(
            &mut out,
            format!(
                "PI ESTIMATE: {:<19}RUN TIME: {:010}",
                truncate_digits(snapshot.estimate, precision),
                snapshot.run_time
            ),
        );
    }
    line(
        &mut out,
        format!(
            "PI ACTUAL:   {:<19}POINTS GENERATED: {:>10}",
            truncate_digits(std::f64::consts::PI, precision),
            snapshot.points_generated
        ),
    );
    line(
        &mut out,
        format!(
            "{:30}ACCURACY ACHIEVED: {:.3}%",
            "", snapshot.current_accuracy
        ),
    );
    border(&mut out, '=');

    out
}

fn render_row(row: &RowSnapshot) -> String {
    format!(
        "{:<9}{:>6}{:>15}{:>9}{:>10}{:>10}{:>11}",
        row.id.to_string(),
        if row.active { 'A' } else { 'I' },
        row.last_local_time,
        row.sequence,
        row.ping_count,
        row.round,
        row.result
    )
}

/// Format a non-negative value with exactly `digits` decimals, truncating
///
/// Truncation happens on the scaled integer, so no digit is ever rounded up.
pub fn truncate_digits(value: f64, digits: u32) -> String {
    let scale = 10u64.pow(digits);
    // `as` saturates, and negative or NaN inputs land on zero.
    let scaled = (value * scale as f64) as u64;
    if digits == 0 {
        return scaled.to_string();
    }
    format!(
        "{}.{:0width$}",
        scaled / scale,
        scaled % scale,
        width = digits as usize
    )
}

fn border(out: &mut String, fill: char) {
    let _ = writeln!(out, "+{}+", fill.to_string().repeat(WIDTH));
}

fn line(out: &mut String, mut content: String) {
    // Content never legitimately exceeds the box; clip rather than break it.
    if content.len() > WIDTH {
        content.truncate(WIDTH);
    }
    let _ = writeln!(out, "|{:<width$}|", content, width = WIDTH);
}
