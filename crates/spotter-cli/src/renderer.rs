//! Terminal output: markdown through termimad, or JSON.

use std::fmt::Display;

use anyhow::Result;
use serde::Serialize;
use termimad::{crossterm::style::Color, MadSkin};

/// Renders command results as rich markdown, plain markdown or JSON.
pub struct TerminalRenderer {
    rich_enabled: bool,
    json: bool,
    skin: MadSkin,
}

impl TerminalRenderer {
    pub fn new(rich_enabled: bool, json: bool) -> Self {
        let mut skin = MadSkin::default();

        skin.set_headers_fg(Color::Blue);
        skin.bold.set_fg(Color::Yellow);
        skin.italic.set_fg(Color::Magenta);
        skin.code_block.set_bg(Color::AnsiValue(238));
        skin.inline_code.set_bg(Color::AnsiValue(238));

        Self {
            rich_enabled,
            json,
            skin,
        }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Prints `value` as JSON in JSON mode, `markdown` otherwise.
    pub fn show<T: Serialize + ?Sized>(&self, value: &T, markdown: impl Display) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        } else {
            self.render(&markdown.to_string())
        }
    }

    /// Render markdown text to terminal
    pub fn render(&self, markdown: &str) -> Result<()> {
        if !self.rich_enabled {
            print!("{markdown}");
            return Ok(());
        }

        // Tables need the whole block to size their columns.
        let mut table = String::new();
        for line in markdown.lines() {
            if line.starts_with('|') {
                table.push_str(line);
                table.push('\n');
                continue;
            }
            if !table.is_empty() {
                self.skin.print_text(&table);
                table.clear();
            }
            if line.starts_with('#') {
                println!("\x1b[34m{line}\x1b[0m");
            } else {
                self.skin.print_inline(line);
                println!();
            }
        }
        if !table.is_empty() {
            self.skin.print_text(&table);
        }
        Ok(())
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_renderer() {
        let renderer = TerminalRenderer::new(false, false);
        assert!(!renderer.rich_enabled);
        assert!(!renderer.is_json());
    }

    #[test]
    fn test_json_renderer() {
        let renderer = TerminalRenderer::new(false, true);
        assert!(renderer.is_json());
    }

    #[test]
    fn test_default_is_rich_markdown() {
        let renderer = TerminalRenderer::default();
        assert!(renderer.rich_enabled);
        assert!(!renderer.is_json());
    }
}
