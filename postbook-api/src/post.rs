use crate::{Author, CommentId, Error, PostId, Time, UserId, Uuid, Validator};

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Like {
    pub user_id: UserId,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: UserId,
    pub author_name: String,
    pub author_avatar: String,
    pub text: String,
    pub created_at: Time,
}

impl Comment {
    pub fn now(author: &Author, text: String) -> Comment {
        Comment {
            id: CommentId(Uuid::new_v4()),
            author_id: author.id,
            author_name: author.name.clone(),
            author_avatar: author.avatar.clone(),
            text,
            created_at: crate::now(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,

    /// Copied from the author's profile when the post was created
    pub author_name: String,
    pub author_avatar: String,

    pub text: String,

    /// Most recent first, at most one per user
    pub likes: Vec<Like>,

    /// Most recent first
    pub comments: Vec<Comment>,

    pub created_at: Time,
}

impl Post {
    pub fn now(author: &Author, text: String) -> Post {
        Post {
            id: PostId(Uuid::new_v4()),
            author_id: author.id,
            author_name: author.name.clone(),
            author_avatar: author.avatar.clone(),
            text,
            likes: Vec::new(),
            comments: Vec::new(),
            created_at: crate::now(),
        }
    }

    pub fn is_liked_by(&self, user: UserId) -> bool {
        self.likes.iter().any(|l| l.user_id == user)
    }

    pub fn like(&mut self, user: UserId) -> Result<(), Error> {
        if self.is_liked_by(user) {
            return Err(Error::AlreadyLiked);
        }
        self.likes.insert(0, Like { user_id: user });
        Ok(())
    }

    pub fn unlike(&mut self, user: UserId) -> Result<(), Error> {
        let idx = self
            .likes
            .iter()
            .position(|l| l.user_id == user)
            .ok_or(Error::NotYetLiked)?;
        self.likes.remove(idx);
        Ok(())
    }

    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.insert(0, comment);
    }

    /// Removes comment `comment`, which must have been written by `requester`
    pub fn remove_comment(&mut self, comment: CommentId, requester: UserId) -> Result<(), Error> {
        let idx = self
            .comments
            .iter()
            .position(|c| c.id == comment)
            .ok_or(Error::CommentNotFound)?;
        if self.comments[idx].author_id != requester {
            return Err(Error::PermissionDenied);
        }
        self.comments.remove(idx);
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewPost {
    #[serde(default)]
    pub text: String,
}

impl NewPost {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::default();
        v.required("text", &self.text, "Text is required");
        v.finish()
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    #[serde(default)]
    pub text: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::default();
        v.required("text", &self.text, "Text is required");
        v.finish()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostList {
    pub count: usize,
    pub posts: Vec<Post>,
}

impl From<Vec<Post>> for PostList {
    fn from(posts: Vec<Post>) -> PostList {
        PostList {
            count: posts.len(),
            posts,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SinglePost {
    pub post: Post,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Removed {
    pub msg: String,
}
