use indicatif::{ProgressBar, ProgressStyle};

/// Console progress bar for a transfer loop: cyan phase prefix, 15-char
/// green bar, running count.
pub fn transfer_bar(total: u64, phase: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{prefix:.cyan} [{bar:15.green}] {pos}/{len}")
            .expect("valid progress template")
            .progress_chars("=> "),
    );
    bar.set_prefix(phase.to_string());
    bar
}
