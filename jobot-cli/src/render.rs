//! Terminal rendering of the transcript.

use console::{measure_text_width, style, Term};
use jobot_common::{Message, Role};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// Where a chat session draws itself.
pub trait ChatView {
    /// Show a notice that is not part of the transcript.
    fn warn(&mut self, message: &str);

    /// Render a complete message block.
    fn show_message(&mut self, message: &Message);

    /// A reply is on its way and nothing has arrived yet.
    fn typing(&mut self);

    /// The reply in progress now reads `content`.
    fn stream_update(&mut self, content: &str);

    /// The reply in progress has settled as `message`.
    fn stream_finished(&mut self, message: &Message);
}

const TYPING: &str = "Jobot is typing…";

pub fn label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Jobot",
        Role::System => "System",
    }
}

fn styled_label(role: Role) -> String {
    match role {
        Role::User => style(label(role)).cyan().bold().to_string(),
        Role::Assistant => style(label(role)).green().bold().to_string(),
        Role::System => style(label(role)).dim().to_string(),
    }
}

/// Format markdown for a terminal.
pub fn format_markdown(source: &str) -> String {
    let mut out = String::new();
    let mut list_depth: Vec<Option<u64>> = Vec::new();
    let mut in_code_block = false;
    let mut bold = 0usize;
    let mut italic = 0usize;
    let mut heading = false;
    let mut link_target: Option<String> = None;

    let push_text = |out: &mut String, text: &str, bold: bool, italic: bool, heading: bool| {
        let mut styled = style(text.to_string());
        if bold || heading {
            styled = styled.bold();
        }
        if italic {
            styled = styled.italic();
        }
        if heading {
            styled = styled.underlined();
        }
        out.push_str(&styled.to_string());
    };

    let parser = Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES);
    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                heading = true;
                if level == HeadingLevel::H1 {
                    out.push_str(&style("# ").dim().to_string());
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                heading = false;
                out.push_str("\n\n");
            }
            Event::End(TagEnd::Paragraph) => {
                out.push_str(if list_depth.is_empty() { "\n\n" } else { "\n" });
            }
            Event::Start(Tag::Strong) => bold += 1,
            Event::End(TagEnd::Strong) => bold = bold.saturating_sub(1),
            Event::Start(Tag::Emphasis) => italic += 1,
            Event::End(TagEnd::Emphasis) => italic = italic.saturating_sub(1),
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        out.push_str(&style(format!("  {lang}")).dim().to_string());
                        out.push('\n');
                    }
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                out.push('\n');
            }
            Event::Start(Tag::List(start)) => list_depth.push(start),
            Event::End(TagEnd::List(_)) => {
                list_depth.pop();
                if list_depth.is_empty() {
                    out.push('\n');
                }
            }
            Event::Start(Tag::Item) => {
                let indent = "  ".repeat(list_depth.len().saturating_sub(1));
                let bullet = match list_depth.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}.");
                        *n += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                out.push_str(&format!("{indent}{} ", style(bullet).yellow()));
            }
            Event::End(TagEnd::Item) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::Start(Tag::Link { dest_url, .. }) => link_target = Some(dest_url.to_string()),
            Event::End(TagEnd::Link) => {
                if let Some(url) = link_target.take() {
                    out.push_str(&style(format!(" ({url})")).dim().to_string());
                }
            }
            Event::Text(text) => {
                if in_code_block {
                    for line in text.lines() {
                        out.push_str("    ");
                        out.push_str(&style(line).cyan().to_string());
                        out.push('\n');
                    }
                } else {
                    push_text(&mut out, &*text, bold > 0, italic > 0, heading);
                }
            }
            Event::Code(code) => out.push_str(&style(format!("`{code}`")).cyan().to_string()),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => {
                out.push_str(&style("────────").dim().to_string());
                out.push_str("\n\n");
            }
            _ => {}
        }
    }

    out.trim_end().to_string()
}

/// Rows a block of text occupies on a terminal `width` columns wide.
fn rows(text: &str, width: usize) -> usize {
    let width = width.max(1);
    text.split('\n')
        .map(|line| measure_text_width(line).max(1).div_ceil(width))
        .sum()
}

/// [`ChatView`] writing to stdout, with notices on stderr.
pub struct TerminalView {
    out: Term,
    err: Term,
    /// Raw text of the reply in progress, as echoed so far
    echoed: String,
}

impl TerminalView {
    pub fn new() -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            echoed: String::new(),
        }
    }

    fn width(&self) -> usize {
        usize::from(self.out.size().1)
    }

    fn write(&self, text: &str) {
        if let Err(e) = self.out.write_str(text).and_then(|()| self.out.flush()) {
            tracing::debug!(error = %e, "Terminal write failed");
        }
    }

    pub fn prompt(&self) {
        self.write(&format!("{} ", style("›").cyan().bold()));
    }

    /// Remove the echoed input line; it is redrawn as a "You" block.
    pub fn clear_prompt(&self) {
        if self.out.is_term() {
            if let Err(e) = self.out.clear_last_lines(1) {
                tracing::debug!(error = %e, "Terminal clear failed");
            }
        }
    }

    pub fn banner(&self, endpoint: &str, stream: bool) {
        let mode = if stream { "streaming" } else { "single reply" };
        self.write(&format!(
            "{} {}\n{}\n\n",
            style("Jobot").green().bold(),
            style(format!("· {endpoint} · {mode}")).dim(),
            style("Type a message. /history shows the transcript, /quit leaves.").dim()
        ));
    }
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatView for TerminalView {
    fn warn(&mut self, message: &str) {
        let line = format!("{} {}", style("⚠").yellow().bold(), style(message).yellow());
        if let Err(e) = self.err.write_line(&line) {
            tracing::debug!(error = %e, "Terminal write failed");
        }
    }

    fn show_message(&mut self, message: &Message) {
        self.write(&format!(
            "{}\n{}\n\n",
            styled_label(message.role),
            format_markdown(&message.content)
        ));
    }

    fn typing(&mut self) {
        self.echoed.clear();
        self.write(&format!(
            "{}\n{}",
            styled_label(Role::Assistant),
            style(TYPING).dim().italic()
        ));
    }

    fn stream_update(&mut self, content: &str) {
        if self.echoed.is_empty() && self.out.is_term() {
            // drop the typing indicator
            if let Err(e) = self.out.clear_line() {
                tracing::debug!(error = %e, "Terminal clear failed");
            }
        } else if self.echoed.is_empty() {
            self.write("\n");
        }

        let delta = content.strip_prefix(self.echoed.as_str()).unwrap_or(content);
        self.write(delta);
        self.echoed = content.to_string();
    }

    fn stream_finished(&mut self, message: &Message) {
        if self.out.is_term() {
            let body = if self.echoed.is_empty() { TYPING } else { self.echoed.as_str() };
            let echoed_rows = 1 + rows(body, self.width());
            // wipe the label and the raw echo, then redraw formatted
            self.write("\n");
            if let Err(e) = self.out.clear_last_lines(echoed_rows) {
                tracing::debug!(error = %e, "Terminal clear failed");
            }
            self.show_message(message);
        } else if self.echoed == message.content {
            self.write("\n\n");
        } else {
            self.write(&format!("\n{}\n\n", message.content));
        }
        self.echoed.clear();
    }
}
