use std::collections::BTreeMap;

use chrono::{Local, TimeZone};
use pulldown_cmark::{CodeBlockKind, Event, LinkType, Options, Parser, Tag};

use crate::types::Note;

/// Normalize `text` as markdown: ATX headings, `-` bullets, `*emphasis*`,
/// `**strong**`, fenced code, `---` rules, one trailing newline.
///
/// Whitespace-only input is returned as-is. If the document renders to
/// nothing (e.g. only link definitions) the input is returned unchanged.
pub fn format_markdown(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    let mut events = Parser::new_ext(text, Options::empty());
    let blocks = parse_blocks(&mut events);
    let rendered = render_blocks(&blocks);
    if rendered.trim().is_empty() {
        return text.to_string();
    }
    rendered + "\n"
}

/// `format_markdown` on the blocking pool. Any failure yields the raw text.
pub async fn format_markdown_async(text: String) -> String {
    let raw = text.clone();
    match tokio::task::spawn_blocking(move || format_markdown(&text)).await {
        Ok(formatted) => formatted,
        Err(e) => {
            tracing::error!("Error formatting markdown: {e}");
            raw
        }
    }
}

/// Compile notes into one document titled with the thread name, grouped
/// under one heading per local calendar date, newest date first.
pub fn compile_notes_to_markdown(notes: &[Note], thread_name: &str) -> String {
    compile_notes_to_markdown_in(notes, thread_name, &Local)
}

pub fn compile_notes_to_markdown_in<Tz: TimeZone>(
    notes: &[Note],
    thread_name: &str,
    tz: &Tz,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if notes.is_empty() {
        return String::new();
    }

    // Keys are YYYY-MM-DD so lexical order is date order.
    let mut by_date: BTreeMap<String, Vec<&Note>> = BTreeMap::new();
    for note in notes {
        let date = note.created_at.with_timezone(tz).format("%Y-%m-%d").to_string();
        by_date.entry(date).or_default().push(note);
    }

    let mut out = format!("# {thread_name}\n\n");
    for (date, notes) in by_date.iter().rev() {
        out.push_str(&format!("## {date}\n\n"));
        for note in notes {
            out.push_str(&demote_headings(&note.note));
            out.push_str("\n\n");
        }
    }
    out
}

/// Push headings of level 1-4 down two levels so they nest under the date.
fn demote_headings(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let hashes = line.bytes().take_while(|b| *b == b'#').count();
            let rest = &line[hashes..];
            let has_text = rest.len() > 1 && rest.starts_with(' ');
            if (1..=4).contains(&hashes) && has_text {
                format!("{}## {}", &line[..hashes], &rest[1..])
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Document tree ─────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Block {
    Paragraph(Vec<Inline>),
    /// Inline content of a tight list item (no paragraph wrapper).
    Plain(Vec<Inline>),
    Heading(usize, Vec<Inline>),
    Code { info: String, text: String },
    Html(String),
    Quote(Vec<Block>),
    List { start: Option<u64>, items: Vec<Vec<Block>> },
    Rule,
}

#[derive(Debug)]
enum Inline {
    Text(String),
    Code(String),
    Html(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Link { url: String, title: String, autolink: bool, children: Vec<Inline> },
    Image { url: String, title: String, alt: Vec<Inline> },
    Group(Vec<Inline>),
    SoftBreak,
    HardBreak,
}

// ─── Event → tree ──────────────────────────────────────────────────────────────

/// Read blocks until the enclosing container ends (or input runs out).
fn parse_blocks<'a>(events: &mut impl Iterator<Item = Event<'a>>) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut loose_inlines = Vec::new();

    while let Some(event) = events.next() {
        match event {
            Event::End(_) => break,
            Event::Start(Tag::Paragraph) => {
                flush_plain(&mut blocks, &mut loose_inlines);
                blocks.push(Block::Paragraph(parse_inlines(events)));
            }
            Event::Start(Tag::Heading { level, .. }) => {
                flush_plain(&mut blocks, &mut loose_inlines);
                blocks.push(Block::Heading(level as usize, parse_inlines(events)));
            }
            Event::Start(Tag::BlockQuote(_)) => {
                flush_plain(&mut blocks, &mut loose_inlines);
                blocks.push(Block::Quote(parse_blocks(events)));
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                flush_plain(&mut blocks, &mut loose_inlines);
                let info = match kind {
                    CodeBlockKind::Fenced(info) => info.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                blocks.push(Block::Code { info, text: collect_text(events) });
            }
            Event::Start(Tag::HtmlBlock) => {
                flush_plain(&mut blocks, &mut loose_inlines);
                blocks.push(Block::Html(collect_text(events)));
            }
            Event::Start(Tag::List(start)) => {
                flush_plain(&mut blocks, &mut loose_inlines);
                blocks.push(Block::List { start, items: parse_items(events) });
            }
            Event::Rule => {
                flush_plain(&mut blocks, &mut loose_inlines);
                blocks.push(Block::Rule);
            }
            Event::Html(html) => {
                flush_plain(&mut blocks, &mut loose_inlines);
                blocks.push(Block::Html(html.to_string()));
            }
            Event::Start(Tag::Item) => {
                // Items only appear inside lists; treat a stray one as a container.
                blocks.extend(parse_blocks(events));
            }
            other => {
                if let Some(inline) = inline_from_event(other, events) {
                    push_inline(&mut loose_inlines, inline);
                }
            }
        }
    }
    flush_plain(&mut blocks, &mut loose_inlines);
    blocks
}

fn flush_plain(blocks: &mut Vec<Block>, inlines: &mut Vec<Inline>) {
    if !inlines.is_empty() {
        blocks.push(Block::Plain(std::mem::take(inlines)));
    }
}

fn parse_items<'a>(events: &mut impl Iterator<Item = Event<'a>>) -> Vec<Vec<Block>> {
    let mut items = Vec::new();
    while let Some(event) = events.next() {
        match event {
            Event::Start(Tag::Item) => items.push(parse_blocks(events)),
            Event::End(_) => break,
            _ => {}
        }
    }
    items
}

/// Concatenate text until the enclosing tag ends.
fn collect_text<'a>(events: &mut impl Iterator<Item = Event<'a>>) -> String {
    let mut text = String::new();
    for event in events.by_ref() {
        match event {
            Event::End(_) => break,
            Event::Text(t) | Event::Html(t) | Event::Code(t) => text.push_str(&t),
            _ => {}
        }
    }
    text
}

fn parse_inlines<'a>(events: &mut impl Iterator<Item = Event<'a>>) -> Vec<Inline> {
    let mut inlines = Vec::new();
    while let Some(event) = events.next() {
        if let Event::End(_) = event {
            break;
        }
        if let Some(inline) = inline_from_event(event, events) {
            push_inline(&mut inlines, inline);
        }
    }
    inlines
}

/// Append, merging adjacent text so escaping sees whole words.
fn push_inline(inlines: &mut Vec<Inline>, inline: Inline) {
    if let (Some(Inline::Text(prev)), Inline::Text(next)) = (inlines.last_mut(), &inline) {
        prev.push_str(next);
        return;
    }
    inlines.push(inline);
}

fn inline_from_event<'a>(
    event: Event<'a>,
    events: &mut impl Iterator<Item = Event<'a>>,
) -> Option<Inline> {
    let inline = match event {
        Event::Text(t) => Inline::Text(t.to_string()),
        Event::Code(c) => Inline::Code(c.to_string()),
        Event::InlineHtml(h) | Event::Html(h) => Inline::Html(h.to_string()),
        Event::SoftBreak => Inline::SoftBreak,
        Event::HardBreak => Inline::HardBreak,
        Event::Start(Tag::Emphasis) => Inline::Emphasis(parse_inlines(events)),
        Event::Start(Tag::Strong) => Inline::Strong(parse_inlines(events)),
        Event::Start(Tag::Link { link_type, dest_url, title, .. }) => Inline::Link {
            url: dest_url.to_string(),
            title: title.to_string(),
            autolink: matches!(link_type, LinkType::Autolink | LinkType::Email),
            children: parse_inlines(events),
        },
        Event::Start(Tag::Image { dest_url, title, .. }) => Inline::Image {
            url: dest_url.to_string(),
            title: title.to_string(),
            alt: parse_inlines(events),
        },
        // Unsupported inline container: keep its contents.
        Event::Start(_) => Inline::Group(parse_inlines(events)),
        _ => return None,
    };
    Some(inline)
}

// ─── Tree → markdown ───────────────────────────────────────────────────────────

fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            let tight = matches!(blocks[i - 1], Block::Plain(_));
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(&render_block(block));
    }
    out
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Paragraph(inlines) | Block::Plain(inlines) => render_inlines(inlines),
        Block::Heading(level, inlines) => {
            let text = render_inlines(inlines);
            if text.is_empty() {
                "#".repeat(*level)
            } else {
                format!("{} {}", "#".repeat(*level), text.replace('\n', " "))
            }
        }
        Block::Code { info, text } => {
            // A backtick fence cannot carry an info string containing a backtick.
            let fence_char = if info.contains('`') { '~' } else { '`' };
            let fence = fence_char
                .to_string()
                .repeat(longest_run(text, fence_char).max(2) + 1);
            let body = text.strip_suffix('\n').unwrap_or(text);
            if body.is_empty() {
                format!("{fence}{info}\n{fence}")
            } else {
                format!("{fence}{info}\n{body}\n{fence}")
            }
        }
        Block::Html(html) => html.trim_end().to_string(),
        Block::Quote(inner) => prefix_lines(&render_blocks(inner), "> ", ">"),
        Block::List { start, items } => render_list(*start, items),
        Block::Rule => "---".to_string(),
    }
}

fn render_list(start: Option<u64>, items: &[Vec<Block>]) -> String {
    let loose = items
        .iter()
        .any(|item| item.iter().any(|b| matches!(b, Block::Paragraph(_))));
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(if loose { "\n\n" } else { "\n" });
        }
        let marker = match start {
            Some(n) => format!("{}. ", n + i as u64),
            None => "- ".to_string(),
        };
        let indent = " ".repeat(marker.len());
        let body = render_blocks(item);
        let mut lines = body.split('\n');
        out.push_str(marker.trim_end());
        if let Some(first) = lines.next() {
            if !first.is_empty() {
                out.push(' ');
                out.push_str(first);
            }
        }
        for line in lines {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&indent);
                out.push_str(line);
            }
        }
    }
    out
}

fn prefix_lines(text: &str, prefix: &str, empty_prefix: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                empty_prefix.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn render_inlines(inlines: &[Inline]) -> String {
    let mut writer = InlineWriter::default();
    writer.write_all(inlines);
    writer.out
}

struct InlineWriter {
    out: String,
    line_start: bool,
}

impl Default for InlineWriter {
    fn default() -> Self {
        Self { out: String::new(), line_start: true }
    }
}

impl InlineWriter {
    fn write_all(&mut self, inlines: &[Inline]) {
        for inline in inlines {
            self.write(inline);
        }
    }

    fn push(&mut self, s: &str) {
        if !s.is_empty() {
            self.out.push_str(s);
            self.line_start = false;
        }
    }

    fn write(&mut self, inline: &Inline) {
        match inline {
            Inline::Text(text) => {
                let escaped = escape_text(text, self.line_start);
                self.push(&escaped);
            }
            Inline::Code(code) => {
                let ticks = "`".repeat(longest_run(code, '`') + 1);
                let pad = code.starts_with('`') || code.ends_with('`');
                let space = if pad { " " } else { "" };
                self.push(&format!("{ticks}{space}{code}{space}{ticks}"));
            }
            Inline::Html(html) => self.push(html),
            Inline::Emphasis(children) => {
                self.push("*");
                self.write_all(children);
                self.push("*");
            }
            Inline::Strong(children) => {
                self.push("**");
                self.write_all(children);
                self.push("**");
            }
            Inline::Link { url, title, autolink: true, .. } if title.is_empty() => {
                let target = url.strip_prefix("mailto:").unwrap_or(url);
                self.push(&format!("<{target}>"));
            }
            Inline::Group(children) => self.write_all(children),
            Inline::Link { url, title, children, .. } => {
                self.push("[");
                self.write_all(children);
                self.push(&format!("]({})", destination(url, title)));
            }
            Inline::Image { url, title, alt } => {
                self.push("![");
                self.write_all(alt);
                self.push(&format!("]({})", destination(url, title)));
            }
            Inline::SoftBreak => {
                self.out.push('\n');
                self.line_start = true;
            }
            Inline::HardBreak => {
                self.out.push_str("\\\n");
                self.line_start = true;
            }
        }
    }
}

fn destination(url: &str, title: &str) -> String {
    let url = if url.contains(' ') || url.is_empty() {
        format!("<{url}>")
    } else {
        url.to_string()
    };
    if title.is_empty() {
        url
    } else {
        format!("{url} \"{}\"", title.replace('"', "\\\""))
    }
}

/// Escape characters that would otherwise be read as markup.
fn escape_text(text: &str, line_start: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let block_marker = if line_start { line_start_marker(&chars) } else { None };
    let mut out = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        if block_marker == Some(i) {
            out.push('\\');
            out.push(c);
            continue;
        }
        match c {
            '\\' | '*' | '`' | '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            '_' => {
                let prev = i.checked_sub(1).and_then(|p| chars.get(p));
                let next = chars.get(i + 1);
                let intraword = prev.is_some_and(|p| p.is_alphanumeric())
                    && next.is_some_and(|n| n.is_alphanumeric());
                if !intraword {
                    out.push('\\');
                }
                out.push(c);
            }
            '<' if chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic() || *n == '/') => {
                out.push_str("\\<");
            }
            '&' if starts_entity(&chars[i + 1..]) => {
                out.push_str("\\&");
            }
            _ => out.push(c),
        }
    }
    out
}

/// True if `rest` (the text after an `&`) would be read as a character
/// reference: `name;`, `#digits;` or `#xhex;`.
fn starts_entity(rest: &[char]) -> bool {
    let (body, is_valid): (&[char], fn(&char) -> bool) = match rest {
        ['#', 'x' | 'X', tail @ ..] => (tail, char::is_ascii_hexdigit),
        ['#', tail @ ..] => (tail, char::is_ascii_digit),
        _ => (rest, char::is_ascii_alphanumeric),
    };
    let len = body.iter().take_while(|c| is_valid(c)).count();
    len > 0 && body.get(len) == Some(&';')
}

/// Index of the character that would start a block construct if this text
/// began a line: ATX heading, quote, bullet, ordered marker, setext underline.
fn line_start_marker(chars: &[char]) -> Option<usize> {
    let followed_by_space = |i: usize| chars.get(i).map_or(true, |c| *c == ' ' || *c == '\t');
    match chars.first()? {
        '>' => Some(0),
        '-' | '+' if followed_by_space(1) => Some(0),
        '=' if chars.iter().all(|c| *c == '=') => Some(0),
        '#' => {
            let hashes = chars.iter().take_while(|c| **c == '#').count();
            (hashes <= 6 && followed_by_space(hashes)).then_some(0)
        }
        c if c.is_ascii_digit() => {
            let digits = chars.iter().take_while(|c| c.is_ascii_digit()).count();
            let punct = chars.get(digits)?;
            (digits <= 9 && matches!(punct, '.' | ')') && followed_by_space(digits + 1))
                .then_some(digits)
        }
        _ => None,
    }
}
