use chrono::{SubsecRound, Utc};

mod auth;
mod db;
mod error;
mod post;
pub mod service;
mod user;

pub use auth::{AuthToken, NewSession};
pub use db::PostStore;
pub use error::{Error, FieldError};
pub use post::{Comment, Like, NewComment, NewPost, Post, PostList, Removed, SinglePost};
pub use user::{Author, NewUser, ProfileUpdate, User};

pub use uuid::Uuid;
pub type Time = chrono::DateTime<Utc>;

/// Current time at the microsecond precision of a `TIMESTAMPTZ` column, so
/// that a stored value reads back equal to the one that was returned
pub fn now() -> Time {
    Utc::now().trunc_subsecs(6)
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Parses a user id coming from a request path
    pub fn parse(s: &str) -> Result<UserId, Error> {
        Uuid::try_parse(s)
            .map(UserId)
            .map_err(|_| Error::UserNotFound)
    }
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub Uuid);

impl PostId {
    /// Parses a post id coming from a request path
    ///
    /// A malformed id is reported exactly like a missing post.
    pub fn parse(s: &str) -> Result<PostId, Error> {
        Uuid::try_parse(s)
            .map(PostId)
            .map_err(|_| Error::PostNotFound)
    }
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn parse(s: &str) -> Result<CommentId, Error> {
        Uuid::try_parse(s)
            .map(CommentId)
            .map_err(|_| Error::CommentNotFound)
    }
}

/// Collects field-level validation failures before turning them into an `Error::Invalid`
#[derive(Debug, Default)]
pub(crate) struct Validator(Vec<FieldError>);

impl Validator {
    pub(crate) fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.0.push(FieldError {
                field: String::from(field),
                message: String::from(message),
            });
        }
    }

    /// Non-blank text without null bytes, which postgres would refuse anyway
    pub(crate) fn required(&mut self, field: &str, value: &str, message: &str) {
        self.check(!value.trim().is_empty(), field, message);
        self.no_null_byte(field, value);
    }

    pub(crate) fn no_null_byte(&mut self, field: &str, value: &str) {
        self.check(
            !value.contains('\0'),
            field,
            "Null bytes are not allowed",
        );
    }

    pub(crate) fn finish(self) -> Result<(), Error> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Invalid(self.0))
        }
    }
}
