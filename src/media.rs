// ABOUTME: Media resolver: maps archive media entries to repository assets
// ABOUTME: Deduplicates by normalized source path rooted at the _images/ marker

use crate::archive::ArchiveEntry;
use crate::model::MediaAsset;
use crate::repo::ContentRepository;
use crate::runlog::RunLog;
use crate::util::file_extension;
use std::collections::HashMap;

pub const MEDIA_PREFIX: &str = "_images/";

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "svg"];

/// Map from normalized source path to resolved asset, keyed both with and
/// without a leading slash so documents can reference either style.
#[derive(Debug, Default)]
pub struct MediaMap {
    entries: HashMap<String, MediaAsset>,
}

impl MediaMap {
    pub fn new() -> Self {
        MediaMap::default()
    }

    pub fn insert(&mut self, normalized: &str, asset: MediaAsset) {
        self.entries.insert(normalized.to_string(), asset.clone());
        self.entries.insert(format!("/{}", normalized), asset);
    }

    pub fn get(&self, path: &str) -> Option<&MediaAsset> {
        self.entries.get(path)
    }

    /// Resolves a document image reference to its stored URL, tolerating a
    /// leading slash. Unresolvable references return None so the caller can
    /// fall back to the literal path.
    pub fn resolve_src(&self, src: &str) -> Option<&str> {
        let normalized = normalize_media_path(src);
        if normalized.is_empty() {
            return None;
        }
        self.entries
            .get(&normalized)
            .or_else(|| self.entries.get(&format!("/{}", normalized)))
            .map(|asset| asset.url.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A few map keys for diagnostic log lines.
    pub fn sample_keys(&self, limit: usize) -> Vec<&str> {
        self.entries.keys().take(limit).map(|k| k.as_str()).collect()
    }
}

/// Canonicalizes a media reference: backslashes become slashes, the leading
/// slash is dropped, and the path is anchored at the first `_images/`
/// marker. References outside the media convention normalize to empty.
pub fn normalize_media_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches('/');

    match path.find(MEDIA_PREFIX) {
        Some(pos) => path[pos..].to_string(),
        None => String::new(),
    }
}

fn is_image(path: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&file_extension(path).as_str())
}

/// Scans archive entries under the media convention and resolves each to an
/// asset: existing assets with matching source-path provenance are reused,
/// everything else is uploaded. Repeated imports of the same archive are
/// idempotent.
pub fn prepare_media_map(
    entries: &[ArchiveEntry],
    repo: &mut dyn ContentRepository,
    log: &mut RunLog,
) -> MediaMap {
    let mut map = MediaMap::new();

    for entry in entries {
        let normalized = normalize_media_path(&entry.name);
        if normalized.is_empty() || !is_image(&normalized) {
            continue;
        }

        if let Some(existing) = repo.find_asset_by_source_path(&normalized) {
            map.insert(&normalized, existing);
            continue;
        }

        let filename = normalized.rsplit('/').next().unwrap_or(&normalized);
        match repo.create_asset(&entry.bytes, filename, &normalized) {
            Ok(asset) => map.insert(&normalized, asset),
            Err(e) => log.debug(format!("Upload failed for {}: {}", entry.name, e)),
        }
    }

    map
}

/// Resolves a front-matter featured-image reference and attaches it to the
/// item. Remote URLs are unsupported by design and only logged.
pub fn set_featured_image(
    repo: &mut dyn ContentRepository,
    item_id: u64,
    source: &str,
    map: &MediaMap,
    log: &mut RunLog,
) {
    let source = source.trim();
    if source.is_empty() {
        return;
    }

    if source.contains("://") {
        log.debug(format!(
            "Remote featured_image URLs are not supported: {}",
            source
        ));
        return;
    }

    let normalized = normalize_media_path(source);
    if normalized.is_empty() {
        log.debug(format!("featured_image not under {}: {}", MEDIA_PREFIX, source));
        return;
    }

    let asset = repo
        .find_asset_by_source_path(&normalized)
        .or_else(|| map.get(&normalized).cloned());

    match asset {
        Some(asset) => repo.set_featured_asset(item_id, asset.id),
        None => {
            let hint = if map.is_empty() {
                String::new()
            } else {
                format!(" (media map keys: {})", map.sample_keys(5).join(", "))
            };
            log.debug(format!(
                "Could not resolve featured_image for {}; normalized={}{}",
                source, normalized, hint
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemFields, ItemStatus};
    use crate::repo::MemoryRepository;

    fn media_entry(name: &str) -> ArchiveEntry {
        ArchiveEntry::new(name, vec![0x89, 0x50, 0x4e, 0x47])
    }

    #[test]
    fn test_normalize_media_path() {
        assert_eq!(normalize_media_path("/_images/a.png"), "_images/a.png");
        assert_eq!(
            normalize_media_path("export\\_images\\a.png"),
            "_images/a.png"
        );
        assert_eq!(
            normalize_media_path("nested/deep/_images/b.jpg"),
            "_images/b.jpg"
        );
        assert_eq!(normalize_media_path("elsewhere/c.png"), "");
    }

    #[test]
    fn test_prepare_map_uploads_new_assets() {
        let mut repo = MemoryRepository::new();
        let mut log = RunLog::new();
        let entries = vec![
            media_entry("_images/one.png"),
            media_entry("_images/readme.txt"),
            ArchiveEntry::new("posts/post.md", b"---\n---\n".to_vec()),
        ];

        let map = prepare_media_map(&entries, &mut repo, &mut log);

        assert_eq!(repo.asset_count(), 1);
        assert!(map.get("_images/one.png").is_some());
        assert!(map.get("/_images/one.png").is_some());
        assert!(map.get("_images/readme.txt").is_none());
    }

    #[test]
    fn test_prepare_map_reuses_existing_assets() {
        let mut repo = MemoryRepository::new();
        let mut log = RunLog::new();
        let existing = repo
            .create_asset(b"old", "one.png", "_images/one.png")
            .unwrap();

        let entries = vec![media_entry("_images/one.png")];
        let map = prepare_media_map(&entries, &mut repo, &mut log);

        assert_eq!(repo.asset_count(), 1);
        assert_eq!(map.get("_images/one.png").unwrap().id, existing.id);
    }

    #[test]
    fn test_resolve_src_tolerates_leading_slash() {
        let mut map = MediaMap::new();
        map.insert(
            "_images/x.png",
            MediaAsset {
                id: 1,
                url: "/assets/x.png".into(),
            },
        );
        assert_eq!(map.resolve_src("/_images/x.png"), Some("/assets/x.png"));
        assert_eq!(map.resolve_src("_images/x.png"), Some("/assets/x.png"));
        assert_eq!(map.resolve_src("_images/other.png"), None);
        assert_eq!(map.resolve_src("https://cdn/pic.png"), None);
    }

    #[test]
    fn test_featured_image_remote_url_logged() {
        let mut repo = MemoryRepository::new();
        let mut log = RunLog::new();
        let id = repo
            .create_item(ItemFields {
                title: "Post".into(),
                body: String::new(),
                status: ItemStatus::Draft,
                ..Default::default()
            })
            .unwrap();

        set_featured_image(
            &mut repo,
            id,
            "https://example.com/pic.png",
            &MediaMap::new(),
            &mut log,
        );

        assert!(log.contains("Remote featured_image URLs are not supported"));
        assert!(repo.get_item(id).unwrap().featured_image.is_none());
    }

    #[test]
    fn test_featured_image_resolved_from_map() {
        let mut repo = MemoryRepository::new();
        let mut log = RunLog::new();
        let id = repo
            .create_item(ItemFields {
                title: "Post".into(),
                body: String::new(),
                status: ItemStatus::Draft,
                ..Default::default()
            })
            .unwrap();
        let asset = repo
            .create_asset(b"img", "cover.png", "_images/cover.png")
            .unwrap();
        let mut map = MediaMap::new();
        map.insert("_images/cover.png", asset);

        set_featured_image(&mut repo, id, "/_images/cover.png", &map, &mut log);

        assert_eq!(
            repo.get_item(id).unwrap().featured_image.as_deref(),
            Some("_images/cover.png")
        );
    }
}
