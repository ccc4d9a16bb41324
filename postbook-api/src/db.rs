use async_trait::async_trait;

use crate::{Error, Post, PostId};

/// Durable collection of posts
///
/// Infrastructure failures are reported through the outer `anyhow::Result`,
/// while the inner `Result` carries errors meant for the API client.
#[async_trait]
pub trait PostStore: Send {
    async fn insert_post(&mut self, post: &Post) -> anyhow::Result<()>;

    /// All posts, most recently created first
    async fn list_posts(&mut self) -> anyhow::Result<Vec<Post>>;

    async fn fetch_post(&mut self, id: PostId) -> anyhow::Result<Option<Post>>;

    /// Returns `false` if there was no such post
    async fn remove_post(&mut self, id: PostId) -> anyhow::Result<bool>;

    /// Runs `f` on post `id` while no other update can touch it
    ///
    /// The modified post is persisted only if `f` succeeds. Fails with
    /// `Error::PostNotFound` if the post does not exist.
    async fn update_post<T, F>(&mut self, id: PostId, f: F) -> anyhow::Result<Result<T, Error>>
    where
        T: Send,
        F: Send + FnOnce(&mut Post) -> Result<T, Error>;
}
