// ABOUTME: Content repository trait plus an in-memory implementation
// ABOUTME: The memory store backs tests and the CLI's JSON-file persistence

use crate::model::{CommentMode, ContentItem, ExportFilter, ItemFields, MediaAsset};
use crate::util::slugify;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const TAXONOMY_CATEGORY: &str = "category";
pub const TAXONOMY_TAG: &str = "tag";

pub const META_EXPORTED: &str = "exported";
pub const META_EXPORTED_AT: &str = "exported_at";
pub const META_ORIGINAL_ID: &str = "original_id";
pub const META_FOLDER_PATH: &str = "folder_path";
pub const META_SEO_DESCRIPTION: &str = "seo_description";
pub const META_SEO_KEYWORDS: &str = "seo_keywords";
pub const META_PAGE_TEMPLATE: &str = "page_template";
pub const META_PINNED: &str = "pinned";

/// The external content store. Everything the pipelines need from the
/// surrounding system goes through this trait; author references are
/// free-form names the implementation resolves however it likes.
pub trait ContentRepository {
    fn query_items(&self, filter: &ExportFilter) -> Result<Vec<ContentItem>>;
    fn get_item(&self, id: u64) -> Option<ContentItem>;
    fn find_item_by_slug(&self, slug: &str) -> Option<ContentItem>;
    fn create_item(&mut self, fields: ItemFields) -> Result<u64>;
    fn update_item(&mut self, id: u64, fields: ItemFields) -> Result<()>;
    fn set_item_meta(&mut self, id: u64, key: &str, value: &str);
    fn get_item_meta(&self, id: u64, key: &str) -> Option<String>;
    /// Assigns terms in the named taxonomy, creating missing terms.
    /// `append` adds to the existing assignment instead of replacing it.
    fn assign_taxonomy(&mut self, id: u64, taxonomy: &str, terms: &[String], append: bool);
    fn find_asset_by_source_path(&self, path: &str) -> Option<MediaAsset>;
    fn create_asset(&mut self, bytes: &[u8], filename: &str, source_path: &str)
        -> Result<MediaAsset>;
    fn set_featured_asset(&mut self, item_id: u64, asset_id: u64);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredItem {
    item: ContentItem,
    #[serde(default)]
    meta: Vec<(String, String)>,
    #[serde(default)]
    taxonomies: Vec<(String, Vec<String>)>,
    #[serde(default)]
    featured_asset: Option<u64>,
    #[serde(default)]
    menu_order: Option<i64>,
    #[serde(default)]
    comments: Option<CommentMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAsset {
    asset: MediaAsset,
    source_path: String,
    filename: String,
}

/// In-memory repository. Backs unit tests directly; the CLI round-trips it
/// through a JSON file with `load`/`save`. Asset binaries are not retained,
/// only their identity and provenance.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryRepository {
    items: Vec<StoredItem>,
    assets: Vec<StoredAsset>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        MemoryRepository::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(MemoryRepository::new());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    fn next_item_id(&self) -> u64 {
        self.items.iter().map(|s| s.item.id).max().unwrap_or(0) + 1
    }

    fn next_asset_id(&self) -> u64 {
        self.assets.iter().map(|s| s.asset.id).max().unwrap_or(0) + 1
    }

    fn stored(&self, id: u64) -> Option<&StoredItem> {
        self.items.iter().find(|s| s.item.id == id)
    }

    fn stored_mut(&mut self, id: u64) -> Option<&mut StoredItem> {
        self.items.iter_mut().find(|s| s.item.id == id)
    }
}

fn apply_fields(stored: &mut StoredItem, fields: ItemFields) {
    stored.item.title = fields.title;
    stored.item.body = fields.body;
    stored.item.status = fields.status;
    if let Some(slug) = fields.slug {
        stored.item.slug = slug;
    }
    if let Some(date) = fields.date {
        stored.item.date = date;
    }
    if let Some(author) = fields.author {
        stored.item.author = Some(author);
    }
    if let Some(excerpt) = fields.excerpt {
        stored.item.excerpt = Some(excerpt);
    }
    if let Some(parent) = fields.parent {
        stored.item.parent = Some(parent);
    }
    if fields.menu_order.is_some() {
        stored.menu_order = fields.menu_order;
    }
    if fields.comments.is_some() {
        stored.comments = fields.comments;
    }
}

impl ContentRepository for MemoryRepository {
    fn query_items(&self, filter: &ExportFilter) -> Result<Vec<ContentItem>> {
        let mut matched: Vec<&StoredItem> = self
            .items
            .iter()
            .filter(|s| {
                if let Some(status) = filter.status {
                    if s.item.status != status {
                        return false;
                    }
                }
                if let Some(author) = &filter.author {
                    if s.item.author.as_deref() != Some(author.as_str()) {
                        return false;
                    }
                }
                let day = s.item.date.date_naive();
                if let Some(start) = filter.start_date {
                    if day < start {
                        return false;
                    }
                }
                if let Some(end) = filter.end_date {
                    if day > end {
                        return false;
                    }
                }
                if filter.exclude_exported {
                    let flag = s
                        .meta
                        .iter()
                        .find(|(k, _)| k == META_EXPORTED)
                        .map(|(_, v)| v.as_str());
                    if flag == Some("yes") {
                        return false;
                    }
                }
                true
            })
            .collect();

        matched.sort_by(|a, b| b.item.date.cmp(&a.item.date));
        Ok(matched.into_iter().map(|s| s.item.clone()).collect())
    }

    fn get_item(&self, id: u64) -> Option<ContentItem> {
        self.stored(id).map(|s| s.item.clone())
    }

    fn find_item_by_slug(&self, slug: &str) -> Option<ContentItem> {
        self.items
            .iter()
            .find(|s| s.item.slug == slug)
            .map(|s| s.item.clone())
    }

    fn create_item(&mut self, mut fields: ItemFields) -> Result<u64> {
        if fields.title.is_empty() {
            return Err(Error::Persistence("cannot create item without a title".into()));
        }
        let id = self.next_item_id();
        match &fields.slug {
            Some(slug) if !slug.is_empty() => {}
            _ => fields.slug = Some(slugify(&fields.title)),
        }
        let mut stored = StoredItem {
            item: ContentItem {
                id,
                title: String::new(),
                body: String::new(),
                status: fields.status,
                slug: String::new(),
                author: None,
                excerpt: None,
                permalink: None,
                featured_image: None,
                date: fields.date.unwrap_or_else(Utc::now),
                categories: Vec::new(),
                tags: Vec::new(),
                parent: None,
            },
            meta: Vec::new(),
            taxonomies: Vec::new(),
            featured_asset: None,
            menu_order: None,
            comments: None,
        };
        apply_fields(&mut stored, fields);
        self.items.push(stored);
        Ok(id)
    }

    fn update_item(&mut self, id: u64, fields: ItemFields) -> Result<()> {
        let stored = self
            .stored_mut(id)
            .ok_or_else(|| Error::Persistence(format!("no item with id {}", id)))?;
        apply_fields(stored, fields);
        Ok(())
    }

    fn set_item_meta(&mut self, id: u64, key: &str, value: &str) {
        if let Some(stored) = self.stored_mut(id) {
            match stored.meta.iter_mut().find(|(k, _)| k == key) {
                Some(pair) => pair.1 = value.to_string(),
                None => stored.meta.push((key.to_string(), value.to_string())),
            }
        }
    }

    fn get_item_meta(&self, id: u64, key: &str) -> Option<String> {
        self.stored(id)?
            .meta
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn assign_taxonomy(&mut self, id: u64, taxonomy: &str, terms: &[String], append: bool) {
        let Some(stored) = self.stored_mut(id) else {
            return;
        };

        let target = match taxonomy {
            TAXONOMY_CATEGORY => &mut stored.item.categories,
            TAXONOMY_TAG => &mut stored.item.tags,
            _ => {
                match stored.taxonomies.iter_mut().find(|(t, _)| t == taxonomy) {
                    Some((_, existing)) => {
                        if !append {
                            existing.clear();
                        }
                        for term in terms {
                            if !existing.contains(term) {
                                existing.push(term.clone());
                            }
                        }
                    }
                    None => {
                        stored
                            .taxonomies
                            .push((taxonomy.to_string(), terms.to_vec()));
                    }
                }
                return;
            }
        };

        if !append {
            target.clear();
        }
        for term in terms {
            if !target.contains(term) {
                target.push(term.clone());
            }
        }
    }

    fn find_asset_by_source_path(&self, path: &str) -> Option<MediaAsset> {
        self.assets
            .iter()
            .find(|a| a.source_path == path)
            .map(|a| a.asset.clone())
    }

    fn create_asset(
        &mut self,
        _bytes: &[u8],
        filename: &str,
        source_path: &str,
    ) -> Result<MediaAsset> {
        let id = self.next_asset_id();
        let asset = MediaAsset {
            id,
            url: format!("/assets/{}", filename),
        };
        self.assets.push(StoredAsset {
            asset: asset.clone(),
            source_path: source_path.to_string(),
            filename: filename.to_string(),
        });
        Ok(asset)
    }

    fn set_featured_asset(&mut self, item_id: u64, asset_id: u64) {
        let source = self
            .assets
            .iter()
            .find(|a| a.asset.id == asset_id)
            .map(|a| a.source_path.clone());
        if let Some(stored) = self.stored_mut(item_id) {
            stored.featured_asset = Some(asset_id);
            if let Some(source) = source {
                stored.item.featured_image = Some(source);
            }
        }
    }
}
