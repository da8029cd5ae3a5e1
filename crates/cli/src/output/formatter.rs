//! Message formatting shared by all commands
//!
//! In JSON mode stdout carries exactly one JSON document per command and
//! errors go to stderr as `{"error": ...}`.

use serde::Serialize;

use super::OutputConfig;

const GREEN: &str = "32";
const RED: &str = "31";
const YELLOW: &str = "33";

#[derive(Debug, Clone, Default)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    /// Colors never mix with JSON
    pub fn colors_enabled(&self) -> bool {
        self.config.color && !self.config.json
    }

    fn mark(&self, color: &str, glyph: &str) -> String {
        if self.colors_enabled() {
            format!("\x1b[{color}m{glyph}\x1b[0m")
        } else {
            glyph.to_string()
        }
    }

    /// Human confirmation; JSON mode relies on the command's own document
    pub fn success(&self, message: &str) {
        if !self.config.quiet && !self.config.json {
            println!("{} {message}", self.mark(GREEN, "✓"));
        }
    }

    /// Printed even in quiet mode
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            match serde_json::to_string(&error) {
                Ok(line) => eprintln!("{line}"),
                Err(_) => eprintln!("{message}"),
            }
        } else {
            eprintln!("{} {message}", self.mark(RED, "✗"));
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.config.quiet && !self.config.json {
            eprintln!("{} {message}", self.mark(YELLOW, "⚠"));
        }
    }

    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => self.error(&format!("Failed to serialize output: {e}")),
        }
    }

    pub fn println(&self, message: &str) {
        if !self.config.quiet {
            println!("{message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_follow_color_setting() {
        let plain = Formatter::new(OutputConfig {
            color: false,
            ..Default::default()
        });
        assert_eq!(plain.mark(GREEN, "✓"), "✓");

        let colored = Formatter::default();
        assert_eq!(colored.mark(RED, "✗"), "\x1b[31m✗\x1b[0m");
    }

    #[test]
    fn test_json_mode_disables_color() {
        let formatter = Formatter::new(OutputConfig {
            json: true,
            color: true,
            ..Default::default()
        });
        assert!(formatter.is_json());
        assert!(!formatter.colors_enabled());
        assert_eq!(formatter.mark(YELLOW, "⚠"), "⚠");
    }
}
