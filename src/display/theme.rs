//! Consistent color theme and styling for terminal output.

use console::Style;
use std::sync::LazyLock;

/// Global theme instance for consistent styling across the application.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Color theme for terminal output.
#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    /// Headers and titles
    pub header: Style,
    pub dim: Style,
    /// Document paths
    pub path: Style,
    /// Scores and counts
    pub number: Style,
    /// Block keys
    pub key: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bright(),
            error: Style::new().red().bright(),
            warning: Style::new().yellow().bright(),
            header: Style::new().cyan().bold(),
            dim: Style::new().dim(),
            path: Style::new().magenta(),
            number: Style::new().cyan(),
            key: Style::new().yellow(),
        }
    }
}

impl Theme {
    pub fn success_with_icon(&self, text: &str) -> String {
        format!("{} {}", self.apply(&self.success, "✓"), self.apply(&self.success, text))
    }

    pub fn error_with_icon(&self, text: &str) -> String {
        format!("{} {}", self.apply(&self.error, "✗"), self.apply(&self.error, text))
    }

    pub fn warning_with_icon(&self, text: &str) -> String {
        format!("{} {}", self.apply(&self.warning, "⚠"), self.apply(&self.warning, text))
    }

    /// Check if color output should be disabled.
    pub fn should_disable_colors() -> bool {
        use is_terminal::IsTerminal;
        std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal()
    }

    /// Apply theme styling conditionally based on terminal support.
    pub fn apply<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::should_disable_colors() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }
}
