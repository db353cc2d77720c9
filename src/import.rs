// ABOUTME: Import pipeline: archive/document dispatch, upsert decisions, stats
// ABOUTME: Media resolves first; folder placeholders keep hierarchy intact

use crate::archive::{read_archive, ARCHIVE_EXTENSION, DOCUMENT_EXTENSION};
use crate::convert::markdown_to_markup;
use crate::frontmatter::{self, FrontMatter};
use crate::media::{self, MediaMap};
use crate::model::{ImportStats, ItemFields, ItemStatus};
use crate::repo::{
    ContentRepository, META_FOLDER_PATH, META_ORIGINAL_ID, META_PAGE_TEMPLATE, META_PINNED,
    META_SEO_DESCRIPTION, META_SEO_KEYWORDS, TAXONOMY_CATEGORY, TAXONOMY_TAG,
};
use crate::runlog::RunLog;
use crate::util::{file_extension, slugify, title_from_segment};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashSet};

const DEFAULT_TITLE: &str = "Imported Markdown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocOutcome {
    Created,
    Updated,
    Skipped,
}

impl ImportStats {
    fn record(&mut self, outcome: DocOutcome) {
        self.processed += 1;
        match outcome {
            DocOutcome::Created => self.created += 1,
            DocOutcome::Updated => self.updated += 1,
            DocOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Imports an uploaded payload: a ZIP archive of documents and media, or a
/// single document. The declared name decides the handling.
pub fn run_import(
    repo: &mut dyn ContentRepository,
    bytes: &[u8],
    name: &str,
    log: &mut RunLog,
) -> Result<ImportStats> {
    let extension = file_extension(name);
    log.debug(format!("Import payload detected: {} (.{}).", name, extension));

    let mut stats = ImportStats::default();

    if extension == ARCHIVE_EXTENSION {
        let entries = read_archive(bytes)?;
        let media_map = media::prepare_media_map(&entries, repo, log);

        let mut folders: BTreeSet<String> = BTreeSet::new();
        let mut indexed: HashSet<String> = HashSet::new();

        for entry in &entries {
            if !entry.is_document() {
                continue;
            }

            let normalized = entry.name.replace('\\', "/");
            if let Some(pos) = normalized.rfind('/') {
                let dir = normalized[..pos].trim_matches('/').to_string();
                if !dir.is_empty() {
                    if normalized[pos..].eq_ignore_ascii_case("/index.md") {
                        indexed.insert(dir.clone());
                    }
                    folders.insert(dir);
                }
            }

            let markdown = String::from_utf8_lossy(&entry.bytes);
            let outcome = import_document(repo, &markdown, &entry.name, &media_map, log);
            stats.record(outcome);
        }

        create_folder_placeholders(repo, &folders, &indexed, log);
    } else if extension == DOCUMENT_EXTENSION {
        let markdown = String::from_utf8_lossy(bytes);
        let outcome = import_document(repo, &markdown, name, &MediaMap::new(), log);
        stats.record(outcome);
    } else {
        log.debug(format!("Unsupported file extension: {}", extension));
        return Err(Error::UserInput(
            "Only ZIP archives or .md files are supported for import".into(),
        ));
    }

    log.debug(format!(
        "Import completed: processed={}, updated={}, created={}, skipped={}.",
        stats.processed, stats.updated, stats.created, stats.skipped
    ));

    Ok(stats)
}

/// Upserts one document. An identity that resolves to an existing item means
/// update; anything else means create, keeping an unresolved identity as
/// provenance metadata rather than reassigning it.
fn import_document(
    repo: &mut dyn ContentRepository,
    markdown: &str,
    filename: &str,
    media_map: &MediaMap,
    log: &mut RunLog,
) -> DocOutcome {
    let parsed = frontmatter::parse(markdown);
    let fm = frontmatter::validate(&parsed.meta, filename, log);

    if fm.skip {
        log.debug(format!(
            "Skipping import for {} due to skip_file flag.",
            filename
        ));
        return DocOutcome::Skipped;
    }

    let original_id = fm.id;
    let fields = ItemFields {
        title: fm.title.clone().unwrap_or_else(|| DEFAULT_TITLE.into()),
        body: markdown_to_markup(&parsed.content, media_map),
        status: fm.status.unwrap_or(ItemStatus::Draft),
        slug: fm.slug.clone(),
        date: fm.date,
        author: fm.author.clone(),
        excerpt: fm.excerpt.clone(),
        menu_order: fm.menu_order,
        comments: fm.comments,
        parent: None,
    };

    let existing = original_id.and_then(|id| repo.get_item(id));

    match existing {
        Some(item) => match repo.update_item(item.id, fields) {
            Ok(()) => {
                log.debug(format!("Updated item ID {} from {}.", item.id, filename));
                apply_metadata(repo, item.id, &fm, media_map, log);
                DocOutcome::Updated
            }
            Err(e) => {
                log.debug(format!("Failed to update item ID {}: {}", item.id, e));
                DocOutcome::Skipped
            }
        },
        None => match repo.create_item(fields) {
            Ok(new_id) => {
                log.debug(format!("Created new item ID {} from {}.", new_id, filename));
                if let Some(original) = original_id {
                    if repo.get_item_meta(new_id, META_ORIGINAL_ID).is_none() {
                        log.debug(format!(
                            "Original ID {} stored as provenance because no matching item was found.",
                            original
                        ));
                        repo.set_item_meta(new_id, META_ORIGINAL_ID, &original.to_string());
                    }
                }
                apply_metadata(repo, new_id, &fm, media_map, log);
                DocOutcome::Created
            }
            Err(e) => {
                log.debug(format!("Failed to create item from {}: {}", filename, e));
                DocOutcome::Skipped
            }
        },
    }
}

/// Post-upsert application order: taxonomy, custom fields, folder path,
/// SEO meta, featured asset, page template, pinned flag.
fn apply_metadata(
    repo: &mut dyn ContentRepository,
    id: u64,
    fm: &FrontMatter,
    media_map: &MediaMap,
    log: &mut RunLog,
) {
    if !fm.categories.is_empty() {
        repo.assign_taxonomy(id, TAXONOMY_CATEGORY, &fm.categories, false);
    }
    if !fm.tags.is_empty() {
        repo.assign_taxonomy(id, TAXONOMY_TAG, &fm.tags, false);
    }
    for (taxonomy, term) in &fm.taxonomy {
        repo.assign_taxonomy(id, taxonomy, std::slice::from_ref(term), true);
    }

    for (key, value) in &fm.custom_fields {
        repo.set_item_meta(id, key, value);
    }

    if let Some(path) = &fm.folder_path {
        repo.set_item_meta(id, META_FOLDER_PATH, path);
    }

    if let Some(description) = &fm.description {
        repo.set_item_meta(id, META_SEO_DESCRIPTION, description);
    }
    if let Some(keywords) = &fm.keywords {
        repo.set_item_meta(id, META_SEO_KEYWORDS, keywords);
    }

    if let Some(featured) = &fm.featured_image {
        media::set_featured_image(repo, id, featured, media_map, log);
    }

    if let Some(template) = &fm.page_template {
        repo.set_item_meta(id, META_PAGE_TEMPLATE, template);
    }

    if let Some(pinned) = fm.pinned {
        repo.set_item_meta(id, META_PINNED, if pinned { "yes" } else { "no" });
    }
}

/// Directories that contain documents but no `index` document get a draft
/// placeholder item so the hierarchy survives a round trip. An existing item
/// at the same slug suppresses creation.
fn create_folder_placeholders(
    repo: &mut dyn ContentRepository,
    folders: &BTreeSet<String>,
    indexed: &HashSet<String>,
    log: &mut RunLog,
) {
    for folder in folders {
        if indexed.contains(folder) {
            continue;
        }

        let basename = folder.rsplit('/').next().unwrap_or(folder);
        let slug = slugify(basename);
        if slug.is_empty() {
            continue;
        }

        if repo.find_item_by_slug(&slug).is_some() {
            log.debug(format!(
                "Folder item exists for {} (slug {}). Skipping creation.",
                folder, slug
            ));
            continue;
        }

        let fields = ItemFields {
            title: title_from_segment(basename),
            body: String::new(),
            status: ItemStatus::Draft,
            slug: Some(slug),
            ..Default::default()
        };
        match repo.create_item(fields) {
            Ok(id) => log.debug(format!("Created folder item for {} as ID {}.", folder, id)),
            Err(e) => log.debug(format!("Failed to create folder item for {}: {}", folder, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveBuilder;
    use crate::repo::MemoryRepository;

    fn doc(front: &str, body: &str) -> String {
        format!("---\n{}\n---\n\n{}\n", front, body)
    }

    #[test]
    fn test_update_when_identity_exists() {
        let mut repo = MemoryRepository::new();
        let id = repo
            .create_item(ItemFields {
                title: "Original".into(),
                body: "<p>old</p>".into(),
                status: ItemStatus::Published,
                ..Default::default()
            })
            .unwrap();

        let markdown = doc(
            &format!("title: \"Fresh\"\nstatus: \"published\"\nid: {}", id),
            "New body.",
        );
        let mut log = RunLog::new();
        let stats = run_import(&mut repo, markdown.as_bytes(), "fresh.md", &mut log).unwrap();

        assert_eq!(
            stats,
            ImportStats {
                processed: 1,
                updated: 1,
                created: 0,
                skipped: 0
            }
        );
        let item = repo.get_item(id).unwrap();
        assert_eq!(item.title, "Fresh");
        assert_eq!(item.body, "<p>New body.</p>");
    }

    #[test]
    fn test_unresolved_identity_creates_with_provenance() {
        let mut repo = MemoryRepository::new();
        let markdown = doc("title: \"Orphan\"\nid: 999999", "Body.");
        let mut log = RunLog::new();
        let stats = run_import(&mut repo, markdown.as_bytes(), "orphan.md", &mut log).unwrap();

        assert_eq!(
            stats,
            ImportStats {
                processed: 1,
                updated: 0,
                created: 1,
                skipped: 0
            }
        );
        let new_item = repo.find_item_by_slug("orphan").unwrap();
        assert_ne!(new_item.id, 999999);
        assert_eq!(
            repo.get_item_meta(new_item.id, META_ORIGINAL_ID).as_deref(),
            Some("999999")
        );
    }

    #[test]
    fn test_skip_file_short_circuits() {
        let mut repo = MemoryRepository::new();
        let markdown = doc("title: \"Nope\"\nskip_file: yes", "Body.");
        let mut log = RunLog::new();
        let stats = run_import(&mut repo, markdown.as_bytes(), "nope.md", &mut log).unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(repo.item_count(), 0);
        assert!(log.contains("skip_file flag"));
    }

    #[test]
    fn test_unsupported_extension_is_user_input_error() {
        let mut repo = MemoryRepository::new();
        let mut log = RunLog::new();
        let err = run_import(&mut repo, b"bytes", "notes.txt", &mut log).unwrap_err();
        assert!(matches!(err, Error::UserInput(_)));
        assert!(log.contains("Unsupported file extension"));
    }

    #[test]
    fn test_archive_import_with_media_and_folders() {
        let mut repo = MemoryRepository::new();
        let mut builder = ArchiveBuilder::new();
        builder
            .add_entry("_images/cover.png", &[0x89, 0x50, 0x4e, 0x47])
            .unwrap();
        builder
            .add_entry(
                "guides/setup.md",
                doc(
                    "title: \"Setup\"\nfeatured_image: _images/cover.png",
                    "![shot](_images/cover.png)",
                )
                .as_bytes(),
            )
            .unwrap();
        let bytes = builder.finish().unwrap();

        let mut log = RunLog::new();
        let stats = run_import(&mut repo, &bytes, "export.zip", &mut log).unwrap();

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.created, 1);
        assert_eq!(repo.asset_count(), 1);

        // Media resolved inside the document body.
        let setup = repo.find_item_by_slug("setup").unwrap();
        assert!(setup.body.contains("/assets/cover.png"));
        assert_eq!(setup.featured_image.as_deref(), Some("_images/cover.png"));

        // Folder placeholder created as a draft.
        let placeholder = repo.find_item_by_slug("guides").unwrap();
        assert_eq!(placeholder.status, ItemStatus::Draft);
        assert_eq!(placeholder.title, "Guides");
    }

    #[test]
    fn test_folder_with_index_gets_no_placeholder() {
        let mut repo = MemoryRepository::new();
        let mut builder = ArchiveBuilder::new();
        builder
            .add_entry("guides/index.md", doc("title: \"Guides Home\"", "Body.").as_bytes())
            .unwrap();
        let bytes = builder.finish().unwrap();

        let mut log = RunLog::new();
        run_import(&mut repo, &bytes, "export.zip", &mut log).unwrap();

        assert!(repo.find_item_by_slug("guides").is_none());
        assert!(repo.find_item_by_slug("guides-home").is_some());
    }

    #[test]
    fn test_taxonomy_and_meta_application() {
        let mut repo = MemoryRepository::new();
        let markdown = doc(
            concat!(
                "title: \"Tagged\"\n",
                "categories: [\"News\"]\n",
                "tags: [\"a\", \"b\"]\n",
                "taxonomy: [\"genre: fiction\"]\n",
                "custom_fields: [\"color: blue\"]\n",
                "meta_description: \"About\"\n",
                "keywords: [\"k1\", \"k2\"]\n",
                "pinned: yes"
            ),
            "Body.",
        );
        let mut log = RunLog::new();
        run_import(&mut repo, markdown.as_bytes(), "tagged.md", &mut log).unwrap();

        let item = repo.find_item_by_slug("tagged").unwrap();
        assert_eq!(item.categories, vec!["News".to_string()]);
        assert_eq!(item.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            repo.get_item_meta(item.id, "color").as_deref(),
            Some("blue")
        );
        assert_eq!(
            repo.get_item_meta(item.id, META_SEO_DESCRIPTION).as_deref(),
            Some("About")
        );
        assert_eq!(
            repo.get_item_meta(item.id, META_SEO_KEYWORDS).as_deref(),
            Some("k1, k2")
        );
        assert_eq!(
            repo.get_item_meta(item.id, META_PINNED).as_deref(),
            Some("yes")
        );
    }
}
