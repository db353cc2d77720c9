// ABOUTME: Front-matter codec: ordered serialization, tolerant parsing, validation
// ABOUTME: Delimited key/value block with escaping rules and inline list support

use crate::model::{CommentMode, ContentItem, ItemStatus};
use crate::runlog::RunLog;
use crate::util::{collapse_whitespace, slugify, strip_tags};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;

pub const DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq)]
pub enum FmValue {
    Scalar(String),
    List(Vec<String>),
}

impl FmValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FmValue::Scalar(s) => Some(s),
            FmValue::List(_) => None,
        }
    }

    /// Scalars promote to a single-element list, matching the tolerant
    /// handling of list-valued keys written as plain strings.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            FmValue::Scalar(s) => vec![s.clone()],
            FmValue::List(items) => items.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub meta: HashMap<String, FmValue>,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Escapes a front-matter string value. Newlines become the two-character
/// sequence `\n`, so a serialized value can never produce a bare delimiter
/// line; carriage returns flatten to spaces.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\r' => out.push(' '),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Renders a list value: tag-stripped, trimmed, deduplicated in input order,
/// each element quoted. An empty list renders as `[]`.
pub fn format_list(items: &[String]) -> String {
    let mut seen = Vec::new();
    for item in items {
        let clean = strip_tags(item).trim().to_string();
        if !clean.is_empty() && !seen.contains(&clean) {
            seen.push(clean);
        }
    }

    if seen.is_empty() {
        return "[]".into();
    }

    let quoted: Vec<String> = seen
        .iter()
        .map(|item| format!("\"{}\"", escape_value(item)))
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// Emits the front-matter block for an item: known fields in fixed order,
/// then the closing delimiter and a trailing blank line.
pub fn serialize(item: &ContentItem) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(DELIMITER.into());
    lines.push(format!("title: \"{}\"", escape_value(&item.title)));
    lines.push(format!("date: {}", item.date.format("%Y-%m-%d")));
    lines.push(format!("status: \"{}\"", item.status.as_str()));
    lines.push(format!("slug: \"{}\"", escape_value(&item.slug)));
    if let Some(permalink) = &item.permalink {
        lines.push(format!("permalink: {}", permalink));
    }
    lines.push(format!("id: {}", item.id));
    if let Some(author) = &item.author {
        lines.push(format!("author: \"{}\"", escape_value(author)));
    }
    if !item.categories.is_empty() {
        lines.push(format!("categories: {}", format_list(&item.categories)));
    }
    if !item.tags.is_empty() {
        lines.push(format!("tags: {}", format_list(&item.tags)));
    }
    if let Some(excerpt) = &item.excerpt {
        let excerpt = collapse_whitespace(&strip_tags(excerpt));
        if !excerpt.is_empty() {
            lines.push(format!("excerpt: \"{}\"", escape_value(&excerpt)));
        }
    }
    if let Some(featured) = &item.featured_image {
        lines.push(format!("featured_image: {}", featured));
    }
    lines.push(DELIMITER.into());
    lines.push(String::new());

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Lowercases and strips every character that is not alphanumeric, `_`, or
/// `-`, so `Featured_Image` and `featured_image` address the same key.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c == '_' || c == '-' {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

/// Splits a document into its front-matter map and body. Input without a
/// leading delimiter-fenced block is all body. Lines without a colon are
/// skipped, never fatal.
pub fn parse(input: &str) -> ParsedDocument {
    let Some(first_nl) = input.find('\n') else {
        return ParsedDocument {
            meta: HashMap::new(),
            content: input.to_string(),
        };
    };

    if input[..first_nl].trim_end_matches('\r').trim() != DELIMITER {
        return ParsedDocument {
            meta: HashMap::new(),
            content: input.to_string(),
        };
    }

    let region = &input[first_nl + 1..];
    let mut offset = 0;
    for line in region.split_inclusive('\n') {
        if line.trim() == DELIMITER {
            let block = &region[..offset];
            let content = &region[offset + line.len()..];
            return ParsedDocument {
                meta: parse_block(block),
                content: content.to_string(),
            };
        }
        offset += line.len();
    }

    // No closing delimiter: treat the whole input as body.
    ParsedDocument {
        meta: HashMap::new(),
        content: input.to_string(),
    }
}

fn parse_block(block: &str) -> HashMap<String, FmValue> {
    let mut meta = HashMap::new();

    for line in block.lines() {
        let Some((raw_key, raw_value)) = line.split_once(':') else {
            continue;
        };
        let key = normalize_key(raw_key.trim());
        if key.is_empty() {
            continue;
        }

        let value = raw_value.trim();
        if value.len() >= 2 && value.starts_with('[') && value.ends_with(']') {
            let items = value[1..value.len() - 1]
                .split(',')
                .map(|item| unescape_value(unquote(item.trim())))
                .filter(|item| !item.is_empty())
                .collect();
            meta.insert(key, FmValue::List(items));
        } else {
            meta.insert(key, FmValue::Scalar(unescape_value(unquote(value))));
        }
    }

    meta
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Typed, sanitized front matter after validation. Unknown keys are dropped;
/// invalid enumerations are logged and omitted rather than applied.
#[derive(Debug, Clone, Default)]
pub struct FrontMatter {
    pub id: Option<u64>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub status: Option<ItemStatus>,
    pub date: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub excerpt: Option<String>,
    pub menu_order: Option<i64>,
    pub comments: Option<CommentMode>,
    pub page_template: Option<String>,
    pub pinned: Option<bool>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub taxonomy: Vec<(String, String)>,
    pub custom_fields: Vec<(String, String)>,
    pub featured_image: Option<String>,
    pub folder_path: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub skip: bool,
}

fn aliased<'a>(
    meta: &'a HashMap<String, FmValue>,
    keys: &[&str],
) -> Option<&'a FmValue> {
    keys.iter().find_map(|key| meta.get(*key))
}

fn clean_list(value: &FmValue) -> Vec<String> {
    let mut out = Vec::new();
    for item in value.to_list() {
        let item = strip_tags(&item).trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

pub fn validate(meta: &HashMap<String, FmValue>, filename: &str, log: &mut RunLog) -> FrontMatter {
    let mut fm = FrontMatter::default();

    if let Some(value) = meta.get("title").and_then(FmValue::as_scalar) {
        let title = strip_tags(value).trim().to_string();
        if !title.is_empty() {
            fm.title = Some(title);
        }
    }

    if let Some(value) = meta.get("slug").and_then(FmValue::as_scalar) {
        let slug = slugify(value);
        if !slug.is_empty() {
            fm.slug = Some(slug);
        }
    }

    if let Some(value) = aliased(meta, &["status", "post_status"]).and_then(FmValue::as_scalar) {
        match ItemStatus::parse(value) {
            Some(status) => fm.status = Some(status),
            None => log.debug(format!(
                "Invalid status in front matter for {}: {}",
                filename, value
            )),
        }
    }

    if let Some(value) = aliased(meta, &["date", "post_date"]).and_then(FmValue::as_scalar) {
        match parse_date(value) {
            Some(date) => fm.date = Some(date),
            None => log.debug(format!(
                "Invalid date in front matter for {}: {}",
                filename, value
            )),
        }
    }

    if let Some(value) = meta.get("menu_order").and_then(FmValue::as_scalar) {
        fm.menu_order = value.trim().parse().ok();
    }

    if let Some(value) = meta.get("author").and_then(FmValue::as_scalar) {
        let author = strip_tags(value).trim().to_string();
        if !author.is_empty() {
            fm.author = Some(author);
        }
    }

    if let Some(value) = aliased(meta, &["excerpt", "post_excerpt"]).and_then(FmValue::as_scalar) {
        let excerpt = strip_tags(value).trim().to_string();
        if !excerpt.is_empty() {
            fm.excerpt = Some(excerpt);
        }
    }

    if let Some(value) = meta.get("comments").and_then(FmValue::as_scalar) {
        match CommentMode::parse(value) {
            Some(mode) => fm.comments = Some(mode),
            None => log.debug(format!(
                "Invalid comments mode in front matter for {}: {}",
                filename, value
            )),
        }
    }

    if let Some(value) = meta.get("page_template").and_then(FmValue::as_scalar) {
        let template = strip_tags(value).trim().to_string();
        if !template.is_empty() {
            fm.page_template = Some(template);
        }
    }

    if let Some(value) = aliased(meta, &["pinned", "stick_post"]).and_then(FmValue::as_scalar) {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" => fm.pinned = Some(true),
            "no" => fm.pinned = Some(false),
            other => log.debug(format!(
                "Invalid pinned flag in front matter for {}: {}",
                filename, other
            )),
        }
    }

    if let Some(value) = meta.get("categories") {
        fm.categories = clean_list(value);
    }

    if let Some(value) = meta.get("tags") {
        fm.tags = clean_list(value);
    }

    if let Some(value) = meta.get("taxonomy") {
        for entry in value.to_list() {
            let entry = strip_tags(&entry).trim().to_string();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once(':') {
                Some((taxonomy, term)) if !taxonomy.trim().is_empty() && !term.trim().is_empty() => {
                    fm.taxonomy
                        .push((taxonomy.trim().to_string(), term.trim().to_string()));
                }
                _ => log.debug(format!(
                    "Invalid taxonomy format in front matter for {}: {}",
                    filename, entry
                )),
            }
        }
    }

    if let Some(value) = meta.get("custom_fields") {
        for entry in value.to_list() {
            let entry = entry.trim().to_string();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once(':') {
                Some((key, val)) if !key.trim().is_empty() => {
                    fm.custom_fields
                        .push((key.trim().to_string(), val.trim().to_string()));
                }
                _ => log.debug(format!(
                    "Invalid custom_fields format in front matter for {}: {}",
                    filename, entry
                )),
            }
        }
    }

    if let Some(value) = meta.get("featured_image").and_then(FmValue::as_scalar) {
        let featured = value.trim().to_string();
        if !featured.is_empty() {
            fm.featured_image = Some(featured);
        }
    }

    if let Some(value) = meta.get("folder_path").and_then(FmValue::as_scalar) {
        let path = value.trim().to_string();
        if !path.is_empty() {
            fm.folder_path = Some(path);
        }
    }

    if let Some(value) =
        aliased(meta, &["description", "meta_description", "metadata"]).and_then(FmValue::as_scalar)
    {
        let description = strip_tags(value).trim().to_string();
        if !description.is_empty() {
            fm.description = Some(description);
        }
    }

    if let Some(value) = aliased(meta, &["keywords", "meta_keywords", "keyword"]) {
        let keywords = clean_list(value).join(", ");
        if !keywords.is_empty() {
            fm.keywords = Some(keywords);
        }
    }

    if let Some(value) = meta.get("skip_file").and_then(FmValue::as_scalar) {
        fm.skip = value.trim().eq_ignore_ascii_case("yes");
    }

    if let Some(value) = meta.get("id").and_then(FmValue::as_scalar) {
        fm.id = value.trim().parse().ok();
    }

    fm
}



#[cfg(test)]
mod validate_tests {
    use super::*;

    fn validated(doc: &str, log: &mut RunLog) -> FrontMatter {
        let parsed = parse(doc);
        validate(&parsed.meta, "test.md", log)
    }

    #[test]
    fn test_valid_fields_pass_through() {
        let mut log = RunLog::new();
        let fm = validated(
            "---\ntitle: \"T\"\nstatus: \"published\"\nslug: \"My Slug\"\ndate: 2025-03-04\nid: 9\n---\nbody",
            &mut log,
        );
        assert_eq!(fm.title.as_deref(), Some("T"));
        assert_eq!(fm.status, Some(ItemStatus::Published));
        assert_eq!(fm.slug.as_deref(), Some("my-slug"));
        assert_eq!(fm.id, Some(9));
        assert!(fm.date.is_some());
        assert!(log.is_empty());
    }

    #[test]
    fn test_legacy_status_alias_accepted() {
        let mut log = RunLog::new();
        let fm = validated("---\npost_status: \"publish\"\n---\nbody", &mut log);
        assert_eq!(fm.status, Some(ItemStatus::Published));
    }

    #[test]
    fn test_invalid_status_warns_and_drops() {
        let mut log = RunLog::new();
        let fm = validated("---\nstatus: \"trash\"\n---\nbody", &mut log);
        assert!(fm.status.is_none());
        assert!(log.contains("Invalid status"));
    }

    #[test]
    fn test_invalid_date_warns_and_drops() {
        let mut log = RunLog::new();
        let fm = validated("---\ndate: not-a-date\n---\nbody", &mut log);
        assert!(fm.date.is_none());
        assert!(log.contains("Invalid date"));
    }

    #[test]
    fn test_taxonomy_pairs_parsed_and_invalid_logged() {
        let mut log = RunLog::new();
        let fm = validated(
            "---\ntaxonomy: [\"genre: fiction\", \"broken\"]\n---\nbody",
            &mut log,
        );
        assert_eq!(fm.taxonomy, vec![("genre".to_string(), "fiction".to_string())]);
        assert!(log.contains("Invalid taxonomy format"));
    }

    #[test]
    fn test_custom_fields_parsed() {
        let mut log = RunLog::new();
        let fm = validated(
            "---\ncustom_fields: [\"color: blue\", \"series: one:two\"]\n---\nbody",
            &mut log,
        );
        assert_eq!(
            fm.custom_fields,
            vec![
                ("color".to_string(), "blue".to_string()),
                ("series".to_string(), "one:two".to_string())
            ]
        );
    }

    #[test]
    fn test_seo_aliases_fold() {
        let mut log = RunLog::new();
        let fm = validated(
            "---\nmetadata: \"About things\"\nkeyword: [\"a\", \"b\"]\n---\nbody",
            &mut log,
        );
        assert_eq!(fm.description.as_deref(), Some("About things"));
        assert_eq!(fm.keywords.as_deref(), Some("a, b"));
    }

    #[test]
    fn test_skip_file_flag() {
        let mut log = RunLog::new();
        let fm = validated("---\nskip_file: yes\n---\nbody", &mut log);
        assert!(fm.skip);
        let fm = validated("---\nskip_file: no\n---\nbody", &mut log);
        assert!(!fm.skip);
    }

    #[test]
    fn test_list_dedup_in_validation() {
        let mut log = RunLog::new();
        let fm = validated("---\ntags: [\"A\", \"B\", \"B\"]\n---\nbody", &mut log);
        assert_eq!(fm.tags, vec!["A".to_string(), "B".to_string()]);
    }
}

#[cfg(test)]
mod roundtrip_tests {
    use super::*;
    use crate::model::ItemStatus;

    #[test]
    fn test_parse_of_serialize_reproduces_fields() {
        let item = ContentItem {
            id: 11,
            title: "Round \"trip\"".into(),
            body: String::new(),
            status: ItemStatus::Draft,
            slug: "round-trip".into(),
            author: Some("Sam".into()),
            excerpt: Some("Short summary".into()),
            permalink: None,
            featured_image: Some("_images/x.png".into()),
            date: "2025-02-03T00:00:00Z".parse().unwrap(),
            categories: vec!["One".into(), "Two".into()],
            tags: vec!["t1".into()],
            parent: None,
        };

        let doc = serialize(&item) + "body";
        let parsed = parse(&doc);
        let mut log = RunLog::new();
        let fm = validate(&parsed.meta, "round.md", &mut log);

        assert_eq!(fm.id, Some(11));
        assert_eq!(fm.title.as_deref(), Some("Round \"trip\""));
        assert_eq!(fm.status, Some(ItemStatus::Draft));
        assert_eq!(fm.slug.as_deref(), Some("round-trip"));
        assert_eq!(fm.date, Some(item.date));
        assert_eq!(fm.author.as_deref(), Some("Sam"));
        assert_eq!(fm.excerpt.as_deref(), Some("Short summary"));
        assert_eq!(fm.categories, item.categories);
        assert_eq!(fm.tags, item.tags);
        assert_eq!(fm.featured_image.as_deref(), Some("_images/x.png"));
        assert!(log.is_empty());
    }
}
