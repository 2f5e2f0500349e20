use indicatif::{ProgressBar, ProgressStyle};

/// Template for the batch export progress bar
const TEMPLATE: &str =
    "{spinner:.green} [{elapsed}] [{bar:.blue}] {human_pos}/{human_len} ({per_sec}, ETA: {eta})";

/// Build a progress bar for decoding `total` messages
pub fn build_progress_bar_export(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_position(0);
    pb
}
