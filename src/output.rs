//! # Output Configuration
//!
//! Controls how packconf prints to the terminal: whether colors and emoji are
//! used, and how compile results and descriptors are rendered.
//!
//! ## Respecting User Preferences
//!
//! The module respects the following environment variables and flags:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals

use std::env;
use std::io::{self, Write};

use console::style;

use crate::descriptor::BuildDescriptor;
use crate::runtime::CompileStats;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// `color_flag` is the value of `--color`: `always` forces colors on
    /// (overriding `NO_COLOR`), `never` forces them off and anything else
    /// detects support from the environment.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = if color_flag.eq_ignore_ascii_case("always") {
            true
        } else if color_flag.eq_ignore_ascii_case("never") {
            false
        } else {
            env_color_override().unwrap_or_else(console::colors_enabled)
        };
        Self { use_color }
    }

    /// Apply this configuration to `console`'s global color switches.
    pub fn apply(&self) {
        console::set_colors_enabled(self.use_color);
        console::set_colors_enabled_stderr(self.use_color);
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

/// Color preference expressed through the environment, if any.
///
/// `NO_COLOR` wins whenever it is present, even when empty.
fn env_color_override() -> Option<bool> {
    let var = |name: &str| env::var(name).ok();
    if env::var_os("NO_COLOR").is_some() || var("CLICOLOR").as_deref() == Some("0") {
        return Some(false);
    }
    match var("CLICOLOR_FORCE").as_deref() {
        Some("") | Some("0") | None => {}
        Some(_) => return Some(true),
    }
    if var("TERM").as_deref() == Some("dumb") {
        return Some(false);
    }
    None
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// The emoji when colors are enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Render one target's compile result.
pub fn format_stats(config: &OutputConfig, stats: &CompileStats) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {}\n",
        emoji(config, "✅", "[OK]"),
        style(&stats.target).bold()
    ));
    for asset in &stats.assets {
        out.push_str(&format!("   {}\n", asset));
    }
    if !stats.warnings.is_empty() {
        out.push_str(&format!(
            "   {} {} warning(s)\n",
            emoji(config, "⚠️", "[WARN]"),
            style(stats.warnings.len()).yellow()
        ));
    }
    if let Some(output) = &stats.output {
        for line in output.lines() {
            out.push_str(&format!("   {}\n", line));
        }
    }
    out
}

pub fn print_stats(config: &OutputConfig, stats: &[CompileStats]) {
    for entry in stats {
        print!("{}", format_stats(config, entry));
    }
}

pub fn print_header(config: &OutputConfig, title: &str) {
    println!("{} {}", emoji(config, "📦", "[packconf]"), style(title).bold());
    println!();
}

/// Write the descriptors as a pretty-printed JSON array.
pub fn write_descriptors<W: Write>(mut writer: W, descriptors: &[BuildDescriptor]) -> io::Result<()> {
    let json = serde_json::to_string_pretty(descriptors)?;
    writeln!(writer, "{}", json)
}
