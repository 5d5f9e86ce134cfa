//! Community board store
//!
//! The posts document on disk is the single source of truth. Every operation
//! reads the full document; every mutation rewrites it while holding the
//! write side of one process-wide lock, so concurrent likes are never lost.
//! Readers take the shared side and only ever see fully written documents.
//!
//! Lock guards are owned by the blocking task doing the I/O, not by the
//! calling future, so a cancelled request cannot release the lock while its
//! read-modify-write is still running.

mod document;

pub use document::PostsDocument;

use crate::error::StoreError;
use crate::models::{Category, Post};
use crate::observability::StructuredLogger;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Escape user text and keep its line breaks as `<br>`
pub fn format_content(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    html_escape::encode_text(&normalized).replace('\n', "<br>")
}

fn validate_post(title: &str, content: &str) -> Result<(), StoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(StoreError::Validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(StoreError::Validation(format!(
            "content must be at most {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(())
}

fn not_found(category: Category, id: u64) -> StoreError {
    StoreError::NotFound {
        category: category.to_string(),
        id,
    }
}

pub struct CommunityStore {
    document: PostsDocument,
    lock: Arc<RwLock<()>>,
    logger: StructuredLogger,
}

impl CommunityStore {
    pub fn new(path: impl Into<PathBuf>, logger: StructuredLogger) -> Self {
        Self {
            document: PostsDocument::new(path),
            lock: Arc::new(RwLock::new(())),
            logger,
        }
    }

    pub fn document(&self) -> &PostsDocument {
        &self.document
    }

    /// Run `f` off the async workers while holding the shared side of the lock
    async fn read_document<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&PostsDocument) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.lock).read_owned().await;
        self.run_blocking(move |document| {
            let _guard = guard;
            f(document)
        })
        .await
    }

    /// Run `f` off the async workers while holding the exclusive side of the lock
    async fn write_document<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&PostsDocument) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.lock).write_owned().await;
        self.run_blocking(move |document| {
            let _guard = guard;
            f(document)
        })
        .await
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&PostsDocument) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let document = self.document.clone();
        tokio::task::spawn_blocking(move || f(&document))
            .await
            .map_err(|e| StoreError::Persistence(anyhow::anyhow!("posts document task failed: {}", e)))?
    }

    /// Posts in persisted order, optionally restricted to one category
    pub async fn list(&self, category: Option<Category>) -> Result<Vec<Post>, StoreError> {
        self.read_document(move |document| {
            let posts = document.load().map_err(StoreError::Persistence)?;
            Ok(match category {
                Some(category) => posts.into_iter().filter(|p| p.category == category).collect(),
                None => posts,
            })
        })
        .await
    }

    pub async fn get_by_id(&self, category: Category, id: u64) -> Result<Post, StoreError> {
        self.read_document(move |document| {
            document
                .load()
                .map_err(StoreError::Persistence)?
                .into_iter()
                .find(|p| p.category == category && p.id == id)
                .ok_or_else(|| not_found(category, id))
        })
        .await
    }

    /// Append a post with the next id and zero likes
    pub async fn create(&self, title: &str, content: &str, category: Category) -> Result<Post, StoreError> {
        validate_post(title, content)?;
        let title = title.trim().to_string();
        let content = format_content(content);

        let post = self
            .write_document(move |document| {
                let mut posts = document.load().map_err(StoreError::Persistence)?;
                let id = posts.iter().map(|p| p.id).max().unwrap_or(0) + 1;
                let post = Post {
                    id,
                    title,
                    content,
                    likes: 0,
                    category,
                };
                posts.push(post.clone());
                document.save(&posts).map_err(StoreError::Persistence)?;
                Ok(post)
            })
            .await?;

        self.logger.log_post_created(post.id, post.category);
        Ok(post)
    }

    pub async fn delete(&self, category: Category, id: u64) -> Result<(), StoreError> {
        self.write_document(move |document| {
            let mut posts = document.load().map_err(StoreError::Persistence)?;
            let idx = posts
                .iter()
                .position(|p| p.category == category && p.id == id)
                .ok_or_else(|| not_found(category, id))?;
            posts.remove(idx);
            document.save(&posts).map_err(StoreError::Persistence)
        })
        .await?;

        self.logger.log_post_deleted(id, category);
        Ok(())
    }

    /// Add one like and return the new count
    pub async fn like(&self, category: Category, id: u64) -> Result<u64, StoreError> {
        let likes = self
            .write_document(move |document| {
                let mut posts = document.load().map_err(StoreError::Persistence)?;
                let post = posts
                    .iter_mut()
                    .find(|p| p.category == category && p.id == id)
                    .ok_or_else(|| not_found(category, id))?;
                post.likes = post.likes.saturating_add(1);
                let likes = post.likes;
                document.save(&posts).map_err(StoreError::Persistence)?;
                Ok(likes)
            })
            .await?;

        self.logger.log_post_liked(id, category, likes);
        Ok(likes)
    }

    /// Number of posts in each category, in `Category::ALL` order
    pub async fn counts(&self) -> Result<Vec<(Category, usize)>, StoreError> {
        let posts = self.list(None).await?;
        Ok(Category::ALL
            .into_iter()
            .map(|c| (c, posts.iter().filter(|p| p.category == c).count()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CommunityStore {
        CommunityStore::new(dir.path().join("posts.json"), StructuredLogger::default())
    }

    #[test]
    fn test_format_content() {
        assert_eq!(format_content("line one\nline two"), "line one<br>line two");
        assert_eq!(format_content("a\r\nb"), "a<br>b");
        assert_eq!(
            format_content("<script>alert(1)</script>\nok"),
            "&lt;script&gt;alert(1)&lt;/script&gt;<br>ok"
        );
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let post = store
            .create("First week", "Hello", Category::FreeTalk)
            .await
            .unwrap();
        assert_eq!(post.id, 1);
        assert_eq!(post.likes, 0);

        let posts = store.list(None).await.unwrap();
        assert_eq!(posts, vec![post]);
    }

    #[tokio::test]
    async fn test_ids_are_max_plus_one() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let a = store.create("a", "", Category::FreeTalk).await.unwrap();
        let b = store.create("b", "", Category::Others).await.unwrap();
        let c = store.create("c", "", Category::FreeTalk).await.unwrap();
        assert_eq!((a.id, b.id, c.id), (1, 2, 3));

        store.delete(Category::Others, b.id).await.unwrap();
        let d = store.create("d", "", Category::Others).await.unwrap();
        assert_eq!(d.id, 4);

        let ids: Vec<u64> = store.list(None).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_list_filters_by_category() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create("talk", "", Category::FreeTalk).await.unwrap();
        store.create("review", "", Category::RehabilitationReviews).await.unwrap();
        store.create("more talk", "", Category::FreeTalk).await.unwrap();

        let talk = store.list(Some(Category::FreeTalk)).await.unwrap();
        assert_eq!(talk.len(), 2);
        assert!(talk.iter().all(|p| p.category == Category::FreeTalk));
        assert_eq!(talk[0].title, "talk");

        let counts = store.counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                (Category::FreeTalk, 2),
                (Category::RehabilitationReviews, 1),
                (Category::Others, 0)
            ]
        );
    }

    #[tokio::test]
    async fn test_day_one_example() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let post = store
            .create("Day 1", "Felt tired.\nBut hopeful.", Category::FreeTalk)
            .await
            .unwrap();
        assert_eq!(post.content, "Felt tired.<br>But hopeful.");

        assert_eq!(store.like(Category::FreeTalk, post.id).await.unwrap(), 1);
        assert_eq!(store.like(Category::FreeTalk, post.id).await.unwrap(), 2);
        assert_eq!(store.get_by_id(Category::FreeTalk, post.id).await.unwrap().likes, 2);

        store.delete(Category::FreeTalk, post.id).await.unwrap();
        let err = store.get_by_id(Category::FreeTalk, post.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_post_leaves_board_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let post = store.create("kept", "", Category::Others).await.unwrap();
        let before = store.list(None).await.unwrap();

        assert!(store.delete(Category::Others, 99).await.unwrap_err().is_not_found());
        // Right id, wrong category
        assert!(store.delete(Category::FreeTalk, post.id).await.unwrap_err().is_not_found());
        assert!(store.like(Category::FreeTalk, post.id).await.unwrap_err().is_not_found());

        assert_eq!(store.list(None).await.unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_likes_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));
        let id = store.create("popular", "", Category::FreeTalk).await.unwrap().id;

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.like(Category::FreeTalk, id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let post = store.get_by_id(Category::FreeTalk, id).await.unwrap();
        assert_eq!(post.likes, 25);
    }

    /// A like dropped mid-flight must not let another writer in while its
    /// rewrite is still running
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_likes_do_not_lose_updates() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));
        let id = store.create("popular", "", Category::FreeTalk).await.unwrap().id;

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        let _ = tokio::time::timeout(Duration::ZERO, store.like(Category::FreeTalk, id)).await;
                        None
                    } else {
                        Some(store.like(Category::FreeTalk, id).await)
                    }
                })
            })
            .collect();
        let mut completed = 0;
        for handle in handles {
            if let Some(result) = handle.await.unwrap() {
                result.unwrap();
                completed += 1;
            }
        }

        // Queues behind any rewrite a cancelled like left running
        let likes = store.like(Category::FreeTalk, id).await.unwrap();
        assert!(likes >= completed + 1, "{} likes after {} completed", likes, completed);
        assert!(likes <= 41);

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("posts.json")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_get_unique_ids() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .create(&format!("post {}", i), "", Category::Others)
                        .await
                })
            })
            .collect();
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_reload_from_disk() {
        let dir = TempDir::new().unwrap();
        let posts = {
            let store = store(&dir);
            store.create("one", "first", Category::FreeTalk).await.unwrap();
            let two = store.create("two", "second", Category::Others).await.unwrap();
            store.like(Category::Others, two.id).await.unwrap();
            store.list(None).await.unwrap()
        };

        let reopened = store(&dir);
        assert_eq!(reopened.list(None).await.unwrap(), posts);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_validation() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store.create("   ", "body", Category::FreeTalk).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let long_title = "t".repeat(MAX_TITLE_CHARS + 1);
        assert!(store.create(&long_title, "", Category::FreeTalk).await.is_err());

        let long_content = "c".repeat(MAX_CONTENT_CHARS + 1);
        assert!(store.create("ok", &long_content, Category::FreeTalk).await.is_err());

        assert!(store.list(None).await.unwrap().is_empty());
        assert!(!store.document().path().exists());
    }

    #[tokio::test]
    async fn test_title_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let post = store(&dir)
            .create("  Spaced  ", "", Category::FreeTalk)
            .await
            .unwrap();
        assert_eq!(post.title, "Spaced");
    }

    #[tokio::test]
    async fn test_corrupt_document_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("posts.json");
        std::fs::write(&path, "not json").unwrap();
        let store = store(&dir);

        assert!(matches!(store.list(None).await, Err(StoreError::Persistence(_))));
        assert!(matches!(
            store.create("hello", "", Category::FreeTalk).await,
            Err(StoreError::Persistence(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }
}
