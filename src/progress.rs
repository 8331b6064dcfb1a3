//! Progress indicators for the converge CLI.

use indicatif::{ProgressBar, ProgressStyle};

/// A bar counting converged resources, hidden when `visible` is false
pub fn bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}
