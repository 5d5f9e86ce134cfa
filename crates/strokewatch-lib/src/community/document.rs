//! Durable posts document
//!
//! The whole board is one JSON array indented by four spaces. Every write
//! goes to its own uniquely named sibling temp file which is synced and then
//! renamed over the document.

use crate::models::Post;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PostsDocument {
    path: PathBuf,
}

impl PostsDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every post; a missing or blank document is an empty board
    pub fn load(&self) -> Result<Vec<Post>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read posts document {:?}", self.path))
            }
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&data)
            .with_context(|| format!("Posts document {:?} is not a valid post list", self.path))
    }

    /// Replace the document with `posts`
    pub fn save(&self, posts: &[Post]) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;

        let mut json = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut json, formatter);
        posts
            .serialize(&mut serializer)
            .context("Failed to serialize posts")?;

        let mut file = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {:?}", parent))?;

        file.write_all(&json).context("Failed to write posts")?;
        file.as_file().sync_all().context("Failed to sync posts document")?;

        file.persist(&self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;

        debug!(path = %self.path.display(), posts = posts.len(), "Posts document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use tempfile::TempDir;

    fn post(id: u64) -> Post {
        Post {
            id,
            title: format!("Post {}", id),
            content: "Walked to the corner today.<br>Slow but steady.".to_string(),
            likes: id,
            category: Category::RehabilitationReviews,
        }
    }

    #[test]
    fn test_missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let document = PostsDocument::new(dir.path().join("posts.json"));
        assert!(document.load().unwrap().is_empty());
    }

    #[test]
    fn test_blank_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("posts.json");
        std::fs::write(&path, "  \n").unwrap();
        assert!(PostsDocument::new(path).load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let document = PostsDocument::new(dir.path().join("data").join("posts.json"));
        let posts = vec![post(1), post(2)];

        document.save(&posts).unwrap();
        assert_eq!(document.load().unwrap(), posts);

        // Temp files never outlive a write
        document.save(&[post(3)]).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path().join("data"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("posts.json")]);
    }

    #[test]
    fn test_document_is_pretty_json_array() {
        let dir = TempDir::new().unwrap();
        let document = PostsDocument::new(dir.path().join("posts.json"));
        document.save(&[post(7)]).unwrap();

        let text = std::fs::read_to_string(document.path()).unwrap();
        assert!(text.starts_with("[\n    {"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["id"], 7);
        assert_eq!(value[0]["category"], "rehabilitation_reviews");
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("posts.json");
        std::fs::write(&path, "{\"id\": 1").unwrap();

        let err = PostsDocument::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("not a valid post list"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"id\": 1");
    }
}
