// ABOUTME: Utility functions for slugging and text sanitization
// ABOUTME: Provides consistent path segment generation and tag stripping

pub fn slugify(text: &str) -> String {
    slug::slugify(text)
}

/// Removes anything that looks like a markup tag, keeping the text between
/// tags. Unterminated tags are dropped to the end of input.
pub fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;

    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    out
}

/// Collapses runs of whitespace (including newlines) to single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-cases a path segment: hyphens and underscores become spaces, each
/// word gets an uppercased first letter. Used for folder placeholder titles.
pub fn title_from_segment(segment: &str) -> String {
    segment
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// File extension of a declared name, lowercased, without the dot.
pub fn file_extension(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Q4 Planning!!!"), "q4-planning");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_slugify_special_chars() {
        assert_eq!(slugify("Föö Bär"), "foo-bar");
        assert_eq!(slugify("Test@#$%123"), "test-123");
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>bold</b> text"), "bold text");
        assert_eq!(strip_tags("no tags"), "no tags");
        assert_eq!(strip_tags("<a href=\"x\">link</a>"), "link");
        assert_eq!(strip_tags("dangling <unclosed"), "dangling ");
    }

    #[test]
    fn test_strip_tags_multibyte() {
        assert_eq!(strip_tags("<em>héllo</em> wörld"), "héllo wörld");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("a  b\n\tc"), "a b c");
        assert_eq!(collapse_whitespace("  padded  "), "padded");
    }

    #[test]
    fn test_title_from_segment() {
        assert_eq!(title_from_segment("release-notes"), "Release Notes");
        assert_eq!(title_from_segment("my_folder"), "My Folder");
        assert_eq!(title_from_segment("single"), "Single");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("export.ZIP"), "zip");
        assert_eq!(file_extension("notes/post.md"), "md");
        assert_eq!(file_extension("README"), "");
    }
}
