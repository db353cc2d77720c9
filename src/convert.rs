// ABOUTME: Bidirectional converter between the structured-markup dialect and Markdown
// ABOUTME: Tag tokenizer for markup->markdown, line state machine for markdown->markup

use crate::media::MediaMap;

// ---------------------------------------------------------------------------
// Markup -> Markdown
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Tag {
        name: String,
        attrs: Vec<(String, String)>,
        closing: bool,
        raw: &'a str,
    },
}

impl<'a> Token<'a> {
    fn attr(&self, key: &str) -> Option<&str> {
        match self {
            Token::Tag { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            Token::Text(_) => None,
        }
    }
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'<' {
            // Comments are dropped whole.
            if input[pos..].starts_with("<!--") {
                if text_start < pos {
                    tokens.push(Token::Text(&input[text_start..pos]));
                }
                pos = match input[pos..].find("-->") {
                    Some(end) => pos + end + 3,
                    None => input.len(),
                };
                text_start = pos;
                continue;
            }
            if let Some((token, end)) = parse_tag(input, pos) {
                if text_start < pos {
                    tokens.push(Token::Text(&input[text_start..pos]));
                }
                tokens.push(token);
                pos = end;
                text_start = pos;
                continue;
            }
        }
        pos += 1;
    }

    if text_start < input.len() {
        tokens.push(Token::Text(&input[text_start..]));
    }

    tokens
}

/// Parses one tag starting at `start` (which must point at `<`). Returns the
/// token and the byte offset just past the closing `>`, or None when the
/// bracket does not open a well-formed tag.
fn parse_tag(input: &str, start: usize) -> Option<(Token<'_>, usize)> {
    let rest = &input[start + 1..];
    let mut chars = rest.char_indices().peekable();

    let closing = matches!(chars.peek(), Some((_, '/')));
    if closing {
        chars.next();
    }

    let mut name = String::new();
    for (_, c) in chars.by_ref() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else {
            break;
        }
    }
    if name.is_empty() || !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let end_rel = rest.find('>')?;
    let inner = &rest[..end_rel];
    let after_name = match inner.find(|c: char| !c.is_ascii_alphanumeric() && c != '/') {
        Some(i) => &inner[i..],
        None => "",
    };

    let token = Token::Tag {
        name,
        attrs: parse_attrs(after_name),
        closing,
        raw: &input[start..start + 1 + end_rel + 1],
    };
    Some((token, start + 1 + end_rel + 1))
}

fn parse_attrs(input: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() || rest == "/" {
            break;
        }

        let name_len = rest
            .find(|c: char| c == '=' || c.is_whitespace() || c == '/')
            .unwrap_or(rest.len());
        if name_len == 0 {
            rest = &rest[1..];
            continue;
        }
        let name = rest[..name_len].to_ascii_lowercase();
        rest = rest[name_len..].trim_start();

        if let Some(stripped) = rest.strip_prefix('=') {
            let value_part = stripped.trim_start();
            let (value, consumed) = match value_part.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let body = &value_part[1..];
                    match body.find(q) {
                        Some(end) => (body[..end].to_string(), end + 2),
                        None => (body.to_string(), value_part.len()),
                    }
                }
                _ => {
                    let end = value_part
                        .find(|c: char| c.is_whitespace())
                        .unwrap_or(value_part.len());
                    (value_part[..end].to_string(), end)
                }
            };
            attrs.push((name, decode_entities(&value)));
            rest = &value_part[consumed.min(value_part.len())..];
        } else {
            attrs.push((name, String::new()));
        }
    }

    attrs
}

/// Renders the structured-markup dialect as Markdown. Total function:
/// unknown tags are stripped, malformed input degrades to plain text.
pub fn markup_to_markdown(input: &str) -> String {
    let tokens = tokenize(input);
    let mut out = String::with_capacity(input.len());
    // Inside list items formatting is flattened to plain text.
    let mut plain_depth: usize = 0;
    let mut href_stack: Vec<String> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Text(text) => out.push_str(&decode_entities(text)),
            Token::Tag {
                name,
                closing: false,
                ..
            } if name == "pre" => {
                let (code, next) = capture_code(&tokens, i + 1, "pre");
                open_block(&mut out);
                out.push_str("\n```\n");
                out.push_str(code.trim_matches(|c| c == '\r' || c == '\n'));
                out.push_str("\n```\n\n");
                i = next;
                continue;
            }
            Token::Tag {
                name,
                closing: false,
                ..
            } if name == "code" => {
                let (code, next) = capture_code(&tokens, i + 1, "code");
                out.push('`');
                out.push_str(code.trim());
                out.push('`');
                i = next;
                continue;
            }
            Token::Tag { name, closing, .. } => {
                match (name.as_str(), *closing) {
                    ("h1", false) | ("h2", false) | ("h3", false) | ("h4", false) => {
                        let level = name[1..].parse::<usize>().unwrap_or(1);
                        open_block(&mut out);
                        out.push_str(&"#".repeat(level));
                        out.push(' ');
                    }
                    ("h1" | "h2" | "h3" | "h4", true) => out.push_str("\n\n"),
                    ("blockquote", false) => {
                        open_block(&mut out);
                        out.push_str("> ");
                    }
                    ("blockquote", true) => out.push_str("\n\n"),
                    ("ul" | "ol", _) => out.push('\n'),
                    ("li", false) => {
                        out.push_str("- ");
                        plain_depth += 1;
                    }
                    ("li", true) => {
                        out.push('\n');
                        plain_depth = plain_depth.saturating_sub(1);
                    }
                    ("strong" | "b", _) if plain_depth == 0 => out.push_str("**"),
                    ("em" | "i", _) if plain_depth == 0 => out.push('*'),
                    ("a", false) if plain_depth == 0 => {
                        let href = tokens[i].attr("href").unwrap_or_default().to_string();
                        href_stack.push(href);
                        out.push('[');
                    }
                    ("a", true) if plain_depth == 0 => {
                        let href = href_stack.pop().unwrap_or_default();
                        out.push_str("](");
                        out.push_str(&href);
                        out.push(')');
                    }
                    ("img", false) if plain_depth == 0 => {
                        let alt = tokens[i].attr("alt").unwrap_or_default();
                        let src = tokens[i].attr("src").unwrap_or_default();
                        if !src.is_empty() {
                            out.push_str(&format!("![{}]({})", alt.trim(), src));
                        }
                    }
                    ("hr", false) => {
                        out.push_str("\n---\n");
                    }
                    ("p", true) => out.push_str("\n\n"),
                    ("br", false) => out.push_str("  \n"),
                    _ => {}
                }
            }
        }
        i += 1;
    }

    normalize_markdown(&out)
}

/// Collects raw content until the matching close tag, preserving markup-like
/// text inside code verbatim (only `code` wrappers are dropped).
fn capture_code<'a>(tokens: &[Token<'a>], from: usize, until: &str) -> (String, usize) {
    let mut code = String::new();
    let mut i = from;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Text(text) => code.push_str(&decode_entities(text)),
            Token::Tag {
                name, closing, raw, ..
            } => {
                if name == until && *closing {
                    return (code, i + 1);
                }
                if name != "code" {
                    code.push_str(raw);
                }
            }
        }
        i += 1;
    }

    (code, i)
}

fn open_block(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push_str("\n\n");
    }
}

fn normalize_markdown(text: &str) -> String {
    let text = text.replace('\r', "");

    // A list item directly after prose gets a paragraph break so the list
    // does not merge into the preceding paragraph. Consecutive items stay
    // adjacent.
    let mut widened = String::with_capacity(text.len());
    let mut prev_line: Option<&str> = None;
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            widened.push('\n');
        }
        if line.starts_with("- ") {
            if let Some(prev) = prev_line {
                if !prev.trim().is_empty() && !prev.starts_with("- ") {
                    widened.push('\n');
                }
            }
        }
        widened.push_str(line);
        prev_line = Some(line);
    }

    // Collapse three or more newlines to a single blank line.
    let mut collapsed = String::with_capacity(widened.len());
    let mut run = 0;
    for c in widened.chars() {
        if c == '\n' {
            run += 1;
            if run <= 2 {
                collapsed.push(c);
            }
        } else {
            run = 0;
            collapsed.push(c);
        }
    }

    collapsed.trim().to_string()
}

// ---------------------------------------------------------------------------
// Markdown -> Markup
// ---------------------------------------------------------------------------

/// Renders Markdown back into the structured-markup dialect. Line-oriented
/// state machine; image sources are resolved through the media map.
pub fn markdown_to_markup(markdown: &str, media: &MediaMap) -> String {
    let markdown = markdown.replace("\r\n", "\n");

    let mut html = String::with_capacity(markdown.len());
    let mut in_list = false;
    let mut in_quote = false;
    let mut in_code = false;
    let mut code_buf: Vec<&str> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    fn flush_paragraph(paragraph: &mut Vec<&str>, html: &mut String, media: &MediaMap) {
        if paragraph.is_empty() {
            return;
        }
        let text = paragraph.join(" ");
        html.push_str("<p>");
        html.push_str(&apply_inline(&text, media));
        html.push_str("</p>");
        paragraph.clear();
    }

    fn close_list(in_list: &mut bool, html: &mut String) {
        if *in_list {
            html.push_str("</ul>");
            *in_list = false;
        }
    }

    fn close_quote(in_quote: &mut bool, html: &mut String) {
        if *in_quote {
            html.push_str("</blockquote>");
            *in_quote = false;
        }
    }

    for line in markdown.split('\n') {
        let trimmed = line.trim();

        if in_code {
            if trimmed.starts_with("```") {
                html.push_str("<pre><code>");
                html.push_str(&escape_markup(&code_buf.join("\n")));
                html.push_str("</code></pre>");
                code_buf.clear();
                in_code = false;
                continue;
            }
            code_buf.push(line);
            continue;
        }

        if trimmed.starts_with("```") {
            flush_paragraph(&mut paragraph, &mut html, media);
            close_list(&mut in_list, &mut html);
            close_quote(&mut in_quote, &mut html);
            in_code = true;
            continue;
        }

        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut html, media);
            close_list(&mut in_list, &mut html);
            close_quote(&mut in_quote, &mut html);
            continue;
        }

        if let Some((level, text)) = parse_heading(trimmed) {
            flush_paragraph(&mut paragraph, &mut html, media);
            close_list(&mut in_list, &mut html);
            close_quote(&mut in_quote, &mut html);
            html.push_str(&format!(
                "<h{level}>{}</h{level}>",
                apply_inline(text, media)
            ));
            continue;
        }

        if trimmed == "---" || trimmed == "***" {
            flush_paragraph(&mut paragraph, &mut html, media);
            close_list(&mut in_list, &mut html);
            close_quote(&mut in_quote, &mut html);
            html.push_str("<hr />");
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("> ") {
            close_list(&mut in_list, &mut html);
            if !in_quote {
                flush_paragraph(&mut paragraph, &mut html, media);
                html.push_str("<blockquote>");
                in_quote = true;
            }
            html.push_str(&apply_inline(rest.trim_start(), media));
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("- ") {
            if !rest.is_empty() {
                flush_paragraph(&mut paragraph, &mut html, media);
                close_quote(&mut in_quote, &mut html);
                if !in_list {
                    html.push_str("<ul>");
                    in_list = true;
                }
                html.push_str("<li>");
                html.push_str(&apply_inline(rest, media));
                html.push_str("</li>");
                continue;
            }
        }

        paragraph.push(trimmed);
    }

    // An unterminated fence at EOF still closes the code block.
    if in_code {
        html.push_str("<pre><code>");
        html.push_str(&escape_markup(&code_buf.join("\n")));
        html.push_str("</code></pre>");
    }

    flush_paragraph(&mut paragraph, &mut html, media);
    close_list(&mut in_list, &mut html);
    close_quote(&mut in_quote, &mut html);

    html
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }
    Some((level, rest.trim_start()))
}

/// Inline transform order: code, bold, italic, image, link. Implemented as a
/// character scanner so code spans are never re-parsed.
fn apply_inline(text: &str, media: &MediaMap) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        let c = rest.chars().next().unwrap_or_default();

        if c == '`' {
            if let Some(end) = rest[1..].find('`') {
                let inner = &rest[1..1 + end];
                if !inner.is_empty() {
                    out.push_str("<code>");
                    out.push_str(&escape_markup(inner));
                    out.push_str("</code>");
                    rest = &rest[end + 2..];
                    continue;
                }
            }
        } else if rest.starts_with("**") {
            if let Some(end) = rest[2..].find("**") {
                let inner = &rest[2..2 + end];
                if !inner.is_empty() {
                    out.push_str("<strong>");
                    out.push_str(&apply_inline(inner, media));
                    out.push_str("</strong>");
                    rest = &rest[end + 4..];
                    continue;
                }
            }
        } else if c == '*' {
            if let Some(end) = rest[1..].find('*') {
                let inner = &rest[1..1 + end];
                if !inner.is_empty() {
                    out.push_str("<em>");
                    out.push_str(&apply_inline(inner, media));
                    out.push_str("</em>");
                    rest = &rest[end + 2..];
                    continue;
                }
            }
        } else if rest.starts_with("![") {
            if let Some((rendered, consumed)) = parse_image(rest, media) {
                out.push_str(&rendered);
                rest = &rest[consumed..];
                continue;
            }
        } else if c == '[' {
            if let Some((rendered, consumed)) = parse_link(rest) {
                out.push_str(&rendered);
                rest = &rest[consumed..];
                continue;
            }
        }

        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// `![alt](src)` or `![alt](src "title")`; src may itself be quoted. A titled
/// image becomes a figure with a caption.
fn parse_image(input: &str, media: &MediaMap) -> Option<(String, usize)> {
    let alt_end = input[2..].find(']')?;
    let alt = &input[2..2 + alt_end];
    let after_alt = &input[2 + alt_end + 1..];
    if !after_alt.starts_with('(') {
        return None;
    }
    let close = after_alt.find(')')?;
    let inner = after_alt[1..close].trim();

    let (raw_src, title) = match inner.split_once(" \"") {
        Some((src, rest)) => (src.trim(), rest.trim_end_matches('"')),
        None => (inner, ""),
    };
    let raw_src = raw_src.trim_matches(['"', '\'']);
    if raw_src.is_empty() || raw_src.contains(char::is_whitespace) {
        return None;
    }

    let src = media.resolve_src(raw_src).unwrap_or(raw_src);

    let mut img = format!(
        "<img src=\"{}\" alt=\"{}\"",
        escape_markup(src),
        escape_markup(alt.trim())
    );
    if !title.is_empty() {
        img.push_str(&format!(" title=\"{}\"", escape_markup(title)));
    }
    img.push_str(" />");

    let consumed = 2 + alt_end + 1 + close + 1;
    if title.is_empty() {
        Some((img, consumed))
    } else {
        Some((
            format!(
                "<figure>{}<figcaption>{}</figcaption></figure>",
                img,
                escape_markup(title)
            ),
            consumed,
        ))
    }
}

fn parse_link(input: &str) -> Option<(String, usize)> {
    let label_end = input[1..].find(']')?;
    let label = &input[1..1 + label_end];
    if label.is_empty() {
        return None;
    }
    let after_label = &input[1 + label_end + 1..];
    if !after_label.starts_with('(') {
        return None;
    }
    let close = after_label.find(')')?;
    let href = after_label[1..close].trim();
    if href.is_empty() {
        return None;
    }

    let rendered = format!(
        "<a href=\"{}\">{}</a>",
        escape_markup(href),
        escape_markup(label)
    );
    Some((rendered, 1 + label_end + 1 + close + 1))
}

// ---------------------------------------------------------------------------
// Shared text helpers
// ---------------------------------------------------------------------------

pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decodes the common named entities plus decimal/hex numeric references.
/// Unknown references are kept verbatim.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];

        let mut semi = None;
        for (i, c) in candidate.char_indices().take(33) {
            if c == ';' {
                semi = Some(i);
                break;
            }
        }
        let Some(semi) = semi else {
            out.push('&');
            rest = &candidate[1..];
            continue;
        };

        let entity = &candidate[1..semi];
        let decoded = decode_entity(entity);
        match decoded {
            Some(c) => {
                out.push_str(&c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<String> {
    let decoded = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "hellip" => '…',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?
        }
    };
    Some(decoded.to_string())
}

#[cfg(test)]
mod markup_to_markdown_tests {
    use super::*;

    #[test]
    fn test_paragraphs_and_breaks() {
        let md = markup_to_markdown("<p>First paragraph</p><p>Second one</p>");
        assert_eq!(md, "First paragraph\n\nSecond one");
    }

    #[test]
    fn test_headings_one_to_four() {
        let md = markup_to_markdown("<h1>One</h1><h2>Two</h2><h3>Three</h3><h4>Four</h4>");
        assert_eq!(md, "# One\n\n## Two\n\n### Three\n\n#### Four");
    }

    #[test]
    fn test_h5_is_stripped_to_text() {
        let md = markup_to_markdown("<h5>Deep heading</h5>");
        assert_eq!(md, "Deep heading");
    }

    #[test]
    fn test_bold_italic_link_image() {
        let md = markup_to_markdown(
            "<p><strong>bold</strong> and <em>italic</em> with <a href=\"https://example.com\">a link</a></p>",
        );
        assert_eq!(
            md,
            "**bold** and *italic* with [a link](https://example.com)"
        );

        let md = markup_to_markdown("<p><img src=\"_images/cat.png\" alt=\"A cat\" title=\"drop me\" /></p>");
        assert_eq!(md, "![A cat](_images/cat.png)");
    }

    #[test]
    fn test_list_items_flattened_to_plain_text() {
        let md = markup_to_markdown("<ul><li><strong>First</strong></li><li>Second</li></ul>");
        assert_eq!(md, "- First\n- Second");
    }

    #[test]
    fn test_list_after_prose_gets_blank_line() {
        let md = markup_to_markdown("Intro line<ul><li>item</li></ul>");
        assert_eq!(md, "Intro line\n\n- item");
    }

    #[test]
    fn test_code_fence_preserves_markup_like_text() {
        let md = markup_to_markdown("<pre><code>let x = &lt;T&gt;::new();\n<b>not bold</b></code></pre>");
        assert_eq!(md, "```\nlet x = <T>::new();\n<b>not bold</b>\n```");
    }

    #[test]
    fn test_inline_code() {
        let md = markup_to_markdown("<p>Call <code> foo() </code> here</p>");
        assert_eq!(md, "Call `foo()` here");
    }

    #[test]
    fn test_blockquote_and_rule() {
        let md = markup_to_markdown("<blockquote><p>Quoted words</p></blockquote><hr /><p>after</p>");
        assert_eq!(md, "> Quoted words\n\n---\nafter");
    }

    #[test]
    fn test_hard_break() {
        let md = markup_to_markdown("<p>line one<br />line two</p>");
        assert_eq!(md, "line one  \nline two");
    }

    #[test]
    fn test_unknown_tags_stripped_entities_decoded() {
        let md = markup_to_markdown("<section>Fish &amp; chips &#8212; cheap</section>");
        assert_eq!(md, "Fish & chips — cheap");
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        let md = markup_to_markdown("Just plain words.");
        assert_eq!(md, "Just plain words.");
    }

    #[test]
    fn test_malformed_input_never_panics() {
        for input in ["<", "<<<>", "<b>unclosed", "</p>", "<a href=>x</a>", "&#xZZ;"] {
            let _ = markup_to_markdown(input);
        }
    }
}



#[cfg(test)]
mod entity_tests {
    use super::*;

    #[test]
    fn test_named_and_numeric_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&lt;tag&gt;"), "<tag>");
        assert_eq!(decode_entities("&#169; &#x2603;"), "© ☃");
    }

    #[test]
    fn test_unknown_entity_kept() {
        assert_eq!(decode_entities("&bogus; &"), "&bogus; &");
    }
}
