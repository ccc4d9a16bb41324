//! Operations on posts, shared by the server and the mock server
//!
//! Callers must have authenticated the acting user and validated any text
//! input before calling in.

use anyhow::Context;

use crate::{Author, Comment, CommentId, Error, Like, Post, PostId, PostStore, UserId};

pub async fn create_post<S: PostStore>(
    store: &mut S,
    author: &Author,
    text: String,
) -> anyhow::Result<Post> {
    let post = Post::now(author, text);
    store
        .insert_post(&post)
        .await
        .with_context(|| format!("inserting post {:?}", post.id))?;
    Ok(post)
}

pub async fn list_posts<S: PostStore>(store: &mut S) -> anyhow::Result<Vec<Post>> {
    store.list_posts().await
}

pub async fn get_post<S: PostStore>(
    store: &mut S,
    id: PostId,
) -> anyhow::Result<Result<Post, Error>> {
    Ok(store
        .fetch_post(id)
        .await
        .with_context(|| format!("fetching post {:?}", id))?
        .ok_or(Error::PostNotFound))
}

pub async fn delete_post<S: PostStore>(
    store: &mut S,
    id: PostId,
    requester: UserId,
) -> anyhow::Result<Result<(), Error>> {
    let post = match get_post(store, id).await? {
        Ok(post) => post,
        Err(e) => return Ok(Err(e)),
    };
    if post.author_id != requester {
        return Ok(Err(Error::PermissionDenied));
    }
    let removed = store
        .remove_post(id)
        .await
        .with_context(|| format!("removing post {:?}", id))?;
    // lost a race against another deletion
    if !removed {
        return Ok(Err(Error::PostNotFound));
    }
    Ok(Ok(()))
}

pub async fn like_post<S: PostStore>(
    store: &mut S,
    id: PostId,
    requester: UserId,
) -> anyhow::Result<Result<Vec<Like>, Error>> {
    store
        .update_post(id, move |p| {
            p.like(requester)?;
            Ok(p.likes.clone())
        })
        .await
        .with_context(|| format!("liking post {:?} as {:?}", id, requester))
}

pub async fn unlike_post<S: PostStore>(
    store: &mut S,
    id: PostId,
    requester: UserId,
) -> anyhow::Result<Result<Vec<Like>, Error>> {
    store
        .update_post(id, move |p| {
            p.unlike(requester)?;
            Ok(p.likes.clone())
        })
        .await
        .with_context(|| format!("unliking post {:?} as {:?}", id, requester))
}

pub async fn add_comment<S: PostStore>(
    store: &mut S,
    id: PostId,
    author: &Author,
    text: String,
) -> anyhow::Result<Result<Vec<Comment>, Error>> {
    let comment = Comment::now(author, text);
    store
        .update_post(id, move |p| {
            p.add_comment(comment);
            Ok(p.comments.clone())
        })
        .await
        .with_context(|| format!("commenting on post {:?} as {:?}", id, author.id))
}

pub async fn delete_comment<S: PostStore>(
    store: &mut S,
    id: PostId,
    comment: CommentId,
    requester: UserId,
) -> anyhow::Result<Result<Vec<Comment>, Error>> {
    store
        .update_post(id, move |p| {
            p.remove_comment(comment, requester)?;
            Ok(p.comments.clone())
        })
        .await
        .with_context(|| {
            format!(
                "removing comment {:?} from post {:?} as {:?}",
                comment, id, requester
            )
        })
}
