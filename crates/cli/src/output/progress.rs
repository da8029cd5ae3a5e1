//! Byte progress for multipart uploads

use super::OutputConfig;

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {binary_bytes_per_sec} ({eta})";

/// Upload progress; draws nothing when progress is off, quiet or JSON
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    pub fn new(config: &OutputConfig, total: u64) -> Self {
        if !config.progress || config.quiet || config.json {
            return Self { bar: None };
        }

        let bar = indicatif::ProgressBar::new(total);
        if let Ok(style) = indicatif::ProgressStyle::default_bar().template(TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar: Some(bar) }
    }

    pub fn inc(&self, delta: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_unless_progress_wanted() {
        let silent = [
            OutputConfig {
                quiet: true,
                ..Default::default()
            },
            OutputConfig {
                json: true,
                ..Default::default()
            },
            OutputConfig {
                progress: false,
                ..Default::default()
            },
        ];
        for config in &silent {
            assert!(!ProgressBar::new(config, 100).is_visible());
        }

        let bar = ProgressBar::new(&OutputConfig::default(), 100);
        assert!(bar.is_visible());
        bar.inc(40);
        bar.finish_and_clear();
    }
}
