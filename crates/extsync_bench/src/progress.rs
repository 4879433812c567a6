use indicatif::{ProgressBar, ProgressStyle};

pub(crate) fn progress_bar(total: usize, show_progress: bool) -> Option<ProgressBar> {
    if !show_progress || total == 0 {
        return None;
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    Some(bar)
}
