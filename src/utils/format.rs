/// Format elapsed milliseconds as `mm:ss`, the display contract for the
/// six-minute timer.
pub fn format_elapsed(elapsed_ms: u64) -> String {
    let total_secs = elapsed_ms / 1_000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Format a distance in meters with two decimal places.
pub fn format_distance(distance_m: f64) -> String {
    format!("{:.2}", distance_m)
}
