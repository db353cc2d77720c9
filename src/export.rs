// ABOUTME: Export pipeline: filter query, hierarchical path derivation, packaging
// ABOUTME: Marks items exported; archive and file list go to the caller and sync

use crate::archive::ArchiveBuilder;
use crate::convert::markup_to_markdown;
use crate::frontmatter;
use crate::model::{ContentItem, ExportFilter};
use crate::repo::{ContentRepository, META_EXPORTED, META_EXPORTED_AT};
use crate::runlog::RunLog;
use crate::util::slugify;
use crate::{Error, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub files: Vec<ExportFile>,
    pub archive: Vec<u8>,
    pub download_name: String,
}

/// Renders one item as a complete document: front matter, a title heading,
/// then the body converted to Markdown.
pub fn render_document(item: &ContentItem) -> String {
    let mut doc = frontmatter::serialize(item);
    doc.push_str(&format!("# {}\n\n", item.title));
    doc.push_str(&markup_to_markdown(&item.body));
    doc.push('\n');
    doc
}

/// Joins the slugs of every ancestor (root to leaf) with the item's own
/// slug. Collisions get `-<n>` appended to the leaf, n starting at 2,
/// tracked across the whole run.
fn derive_entry_name(
    item: &ContentItem,
    repo: &dyn ContentRepository,
    used: &mut HashSet<String>,
) -> String {
    let mut chain: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = item.parent;
    while let Some(parent_id) = cursor {
        if !seen.insert(parent_id) {
            break;
        }
        match repo.get_item(parent_id) {
            Some(parent) => {
                let segment = slugify(&parent.slug);
                if !segment.is_empty() {
                    chain.push(segment);
                }
                cursor = parent.parent;
            }
            None => break,
        }
    }
    chain.reverse();

    let mut leaf = slugify(&item.slug);
    if leaf.is_empty() {
        leaf = format!("item-{}", item.id);
    }

    let base = if chain.is_empty() {
        leaf
    } else {
        format!("{}/{}", chain.join("/"), leaf)
    };

    let mut name = format!("{}.md", base);
    let mut n = 2;
    while used.contains(&name) {
        name = format!("{}-{}.md", base, n);
        n += 1;
    }
    used.insert(name.clone());
    name
}

/// Queries, converts, and packages matching items, marking each exported.
/// Fails with `NoContent` when the filter matches nothing.
pub fn run_export(
    repo: &mut dyn ContentRepository,
    filter: &ExportFilter,
    log: &mut RunLog,
) -> Result<ExportOutcome> {
    let items = repo.query_items(filter)?;
    if items.is_empty() {
        log.debug("No items matched the export filter.");
        return Err(Error::NoContent);
    }
    log.debug(format!("Found {} items to export.", items.len()));

    let pb = ProgressBar::new(items.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} items")
            .unwrap()
            .progress_chars("##-"),
    );

    let now = Utc::now();
    let mut used = HashSet::new();
    let mut files = Vec::new();
    let mut builder = ArchiveBuilder::new();

    for item in &items {
        let name = derive_entry_name(item, &*repo, &mut used);
        let content = render_document(item);
        builder.add_entry(&name, content.as_bytes())?;
        repo.set_item_meta(item.id, META_EXPORTED, "yes");
        repo.set_item_meta(item.id, META_EXPORTED_AT, &now.to_rfc3339());
        files.push(ExportFile { name, content });
        pb.inc(1);
    }

    pb.finish_and_clear();

    let archive = builder.finish()?;
    log.debug(format!("Added {} Markdown files to the archive.", files.len()));
    log.debug(format!("ZIP size: {} bytes.", archive.len()));

    let download_name = format!("markdown-export-{}.zip", now.format("%Y%m%d-%H%M%S"));
    log.debug(format!("Prepared archive: {}.", download_name));

    Ok(ExportOutcome {
        files,
        archive,
        download_name,
    })
}
