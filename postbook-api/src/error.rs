use anyhow::{anyhow, Context};
use serde_json::json;

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Post not found")]
    PostNotFound,

    #[error("Comment not found")]
    CommentNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Post already liked")]
    AlreadyLiked,

    #[error("Post not yet liked")]
    NotYetLiked,

    #[error("Email already used {0}")]
    EmailAlreadyUsed(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid input for {}", field_names(.0))]
    Invalid(Vec<FieldError>),
}

fn field_names(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            // ownership violations are reported like a missing session
            Error::PermissionDenied => StatusCode::UNAUTHORIZED,
            Error::PostNotFound => StatusCode::NOT_FOUND,
            Error::CommentNotFound => StatusCode::NOT_FOUND,
            Error::UserNotFound => StatusCode::NOT_FOUND,
            Error::AlreadyLiked => StatusCode::BAD_REQUEST,
            Error::NotYetLiked => StatusCode::BAD_REQUEST,
            Error::EmailAlreadyUsed(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials => StatusCode::BAD_REQUEST,
            Error::Invalid(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::Unauthenticated => json!({
                "message": "no valid token, authorization denied",
                "type": "unauthenticated",
            }),
            Error::PermissionDenied => json!({
                "message": "user not authorized",
                "type": "permission-denied",
            }),
            Error::PostNotFound => json!({
                "message": "post not found",
                "type": "post-not-found",
            }),
            Error::CommentNotFound => json!({
                "message": "comment does not exist",
                "type": "comment-not-found",
            }),
            Error::UserNotFound => json!({
                "message": "user not found",
                "type": "user-not-found",
            }),
            Error::AlreadyLiked => json!({
                "message": "post already liked",
                "type": "already-liked",
            }),
            Error::NotYetLiked => json!({
                "message": "post has not yet been liked",
                "type": "not-yet-liked",
            }),
            Error::EmailAlreadyUsed(email) => json!({
                "message": "user already exists",
                "type": "conflict-email",
                "email": email,
            }),
            Error::InvalidCredentials => json!({
                "message": "invalid credentials",
                "type": "invalid-credentials",
            }),
            Error::Invalid(errors) => json!({
                "message": "invalid input",
                "type": "invalid",
                "errors": errors,
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "unauthenticated" => Error::Unauthenticated,
                "permission-denied" => Error::PermissionDenied,
                "post-not-found" => Error::PostNotFound,
                "comment-not-found" => Error::CommentNotFound,
                "user-not-found" => Error::UserNotFound,
                "already-liked" => Error::AlreadyLiked,
                "not-yet-liked" => Error::NotYetLiked,
                "conflict-email" => Error::EmailAlreadyUsed(String::from(
                    data.get("email")
                        .and_then(|e| e.as_str())
                        .ok_or_else(|| anyhow!("error is an email conflict without an email"))?,
                )),
                "invalid-credentials" => Error::InvalidCredentials,
                "invalid" => Error::Invalid(
                    serde_json::from_value(
                        data.get("errors")
                            .cloned()
                            .ok_or_else(|| anyhow!("error is a validation failure without errors"))?,
                    )
                    .context("parsing field errors")?,
                ),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
