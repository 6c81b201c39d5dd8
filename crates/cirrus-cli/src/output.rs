//! Formatted output helpers for CLI commands.

const RULE_WIDTH: usize = 35;

/// Prints the double-line rule under a section title.
pub fn print_rule() {
    println!("{}", "\u{2550}".repeat(RULE_WIDTH));
}

/// Formats an archive size for display, e.g. `"3.4 MiB"`.
///
/// Sizes below one KiB are shown in plain bytes.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit + 1 < UNITS.len() {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}
