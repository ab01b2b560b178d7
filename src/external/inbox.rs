//! Inbox watcher: turns files dropped into `Inbox/` into action items.
//!
//! Each file's path is its dedup id, so a file produces exactly one item no matter how
//! often the folder is polled. The dropped file itself is left where it is.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};

use crate::config::InboxConfig;
use crate::domain::{PriorityClassifier, RawItem};
use crate::error::Result;
use crate::external::traits::Source;
use crate::storage::StateStore;

pub const INBOX_ORIGIN: &str = "inbox";
pub const INBOX_ITEM_TYPE: &str = "file_inbox";

/// Polls one folder for new files
#[derive(Debug, Clone)]
pub struct InboxSource {
    dir: PathBuf,
    config: InboxConfig,
    classifier: PriorityClassifier,
}

impl InboxSource {
    pub fn new(dir: impl Into<PathBuf>, config: InboxConfig, classifier: PriorityClassifier) -> Self {
        Self {
            dir: dir.into(),
            config,
            classifier,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_text(&self, extension: &str) -> bool {
        self.config
            .text_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    fn preview(&self, path: &Path, extension: &str, size: u64) -> String {
        if !self.is_text(extension) || size >= self.config.max_preview_bytes {
            return "[Binary or large file - cannot preview]".to_string();
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => return format!("[Error reading file: {}]", e),
        };
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let shown = lines.len().min(self.config.preview_lines);

        let mut preview = lines[..shown].join("\n");
        if lines.len() > shown {
            preview.push_str(&format!("\n... ({} more lines)", lines.len() - shown));
        }
        if preview.is_empty() {
            preview.push_str("[Empty file]");
        }
        preview
    }

    /// Build the action item for one dropped file
    pub fn item_for(&self, path: &Path) -> Result<RawItem> {
        let metadata = fs::metadata(path)?;
        let size = metadata.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let file_type = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };
        let priority = self.classifier.classify(&name);
        let preview = self.preview(path, &extension, size);

        let body = format!(
            "# New File in Inbox: {name}\n\n\
             ## File Information\n\
             - **Path:** `{path}`\n\
             - **Size:** {size} bytes\n\
             - **Type:** {kind}\n\n\
             ## Content Preview\n\
             ```\n{preview}\n```\n\n\
             ## Suggested Actions\n\
             - [ ] Review file content\n\
             - [ ] Categorize and process\n\
             - [ ] Move to appropriate folder\n",
            name = name,
            path = path.display(),
            size = size,
            kind = if file_type.is_empty() { "Unknown" } else { file_type.as_str() },
            preview = preview,
        );

        Ok(RawItem::new(INBOX_ORIGIN, INBOX_ITEM_TYPE, stem)
            .with_dedup_id(path.display().to_string())
            .with_field("source", "filesystem")
            .with_field("priority", priority.as_str())
            .with_field("status", "pending")
            .with_field("original_file", path.display().to_string())
            .with_field("file_size", format!("{} bytes", size))
            .with_field("file_type", file_type)
            .with_body(body))
    }
}

#[async_trait]
impl Source for InboxSource {
    fn name(&self) -> &str {
        INBOX_ORIGIN
    }

    async fn poll(&self, state: &StateStore) -> Result<Vec<RawItem>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Inbox {} does not exist yet", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                !path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with('.'))
            })
            .filter(|path| !state.contains(&path.display().to_string()))
            .collect();
        paths.sort();

        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            match self.item_for(&path) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping inbox file {}: {}", path.display(), e),
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use tempfile::TempDir;

    fn setup() -> (InboxSource, StateStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let inbox = temp.path().join("Inbox");
        fs::create_dir_all(&inbox).unwrap();
        let source = InboxSource::new(&inbox, InboxConfig::default(), PriorityClassifier::default());
        let state = StateStore::load(temp.path().join("watcher_state.json"));
        (source, state, temp)
    }

    #[tokio::test]
    async fn test_text_file_gets_preview_and_headers() {
        let (source, state, _temp) = setup();
        let lines: Vec<String> = (1..=12).map(|i| format!("line {}", i)).collect();
        let path = source.dir().join("urgent_notes.txt");
        fs::write(&path, lines.join("\n")).unwrap();

        let items = source.poll(&state).await.unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.origin, "inbox");
        assert_eq!(item.title, "urgent_notes");
        assert_eq!(item.item_type(), Some("file_inbox"));
        assert_eq!(item.dedup_id.as_deref(), Some(path.display().to_string().as_str()));
        assert_eq!(item.frontmatter.priority(), Priority::Critical);
        assert_eq!(item.frontmatter.get("file_type"), Some(".txt"));
        assert!(item.body.contains("line 10"));
        assert!(!item.body.contains("line 11"));
        assert!(item.body.contains("... (2 more lines)"));
    }

    #[tokio::test]
    async fn test_binary_file_has_no_preview() {
        let (source, state, _temp) = setup();
        fs::write(source.dir().join("photo.jpg"), [0xff, 0xd8, 0xff]).unwrap();

        let items = source.poll(&state).await.unwrap();
        assert!(items[0].body.contains("cannot preview"));
        assert_eq!(items[0].frontmatter.priority(), Priority::Normal);
    }

    #[tokio::test]
    async fn test_skips_processed_hidden_and_directories() {
        let (source, mut state, _temp) = setup();
        let seen = source.dir().join("old.txt");
        fs::write(&seen, "x").unwrap();
        fs::write(source.dir().join(".partial"), "x").unwrap();
        fs::create_dir_all(source.dir().join("nested")).unwrap();
        fs::write(source.dir().join("new.txt"), "x").unwrap();
        state.mark_processed(seen.display().to_string()).unwrap();

        let items = source.poll(&state).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "new");
    }

    #[tokio::test]
    async fn test_missing_inbox_is_empty() {
        let temp = TempDir::new().unwrap();
        let source = InboxSource::new(
            temp.path().join("nope"),
            InboxConfig::default(),
            PriorityClassifier::default(),
        );
        let state = StateStore::load(temp.path().join("s.json"));
        assert!(source.poll(&state).await.unwrap().is_empty());
    }
}
