use owo_colors::OwoColorize;
use parley_core::markup::{self, Segment};
use parley_core::{Message, MessageRole};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::{LinesWithEndings, as_24_bit_terminal_escaped};

/// Terminal syntax highlighter for fenced code blocks
pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl SyntaxHighlighter {
    pub fn new() -> Self {
        let theme_set = ThemeSet::load_defaults();
        let theme = theme_set.themes.get("base16-ocean.dark").cloned().unwrap_or_default();
        Self { syntax_set: SyntaxSet::load_defaults_newlines(), theme }
    }

    /// Highlight code as ANSI-escaped text
    ///
    /// Unknown languages fall back to plain text.
    pub fn highlight_code(&self, code: &str, lang: Option<&str>) -> String {
        let syntax = lang
            .and_then(|lang| {
                self.syntax_set
                    .find_syntax_by_token(lang)
                    .or_else(|| self.syntax_set.find_syntax_by_name(lang))
                    .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
            })
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let mut highlighter = HighlightLines::new(syntax, &self.theme);
        let mut out = String::new();

        for line in LinesWithEndings::from(code) {
            match highlighter.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => out.push_str(&as_24_bit_terminal_escaped(&ranges, false)),
                Err(_) => out.push_str(line),
            }
        }

        out.push_str("\x1b[0m");
        out
    }
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one transcript entry with a 1-based index
pub fn render_message(index: usize, message: &Message, highlighter: &SyntaxHighlighter) -> String {
    let label = match message.role {
        MessageRole::User => format!("[{}] you", index).green().bold().to_string(),
        MessageRole::Assistant => format!("[{}] assistant", index).cyan().bold().to_string(),
    };

    if message.pending {
        return format!("{}\n{}", label, message.content.bright_black());
    }

    let mut out = label;
    let mut block_number = 0;
    for segment in markup::segments(&message.content) {
        out.push('\n');
        match segment {
            Segment::Text(text) => out.push_str(&text),
            Segment::Code(block) => {
                block_number += 1;
                let header = format!("── block {} {}", block_number, block.language.as_deref().unwrap_or(""));
                out.push_str(&header.trim_end().bright_black().to_string());
                out.push('\n');
                out.push_str(&highlighter.highlight_code(&block.code, block.language.as_deref()));
            }
        }
    }

    out
}

/// Render a whole transcript
pub fn render_transcript(messages: &[Message], highlighter: &SyntaxHighlighter) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| render_message(i + 1, message, highlighter))
        .collect::<Vec<_>>()
        .join("\n\n")
}
