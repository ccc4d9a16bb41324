use axum::{
    extract::rejection::JsonRejection,
    http::header,
    response::{IntoResponse, Response},
};
use postbook_api::{Error as ApiError, FieldError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn unauthenticated() -> Error {
        Error::Api(ApiError::Unauthenticated)
    }

    pub fn invalid_credentials() -> Error {
        Error::Api(ApiError::InvalidCredentials)
    }

    /// What the client gets to see of this error
    fn for_client(self) -> ApiError {
        match self {
            Error::Api(err) => {
                tracing::info!(%err, "request refused");
                err
            }
            Error::Anyhow(err) => {
                tracing::error!(?err, "internal server error");
                if cfg!(test) {
                    ApiError::Unknown(format!("Internal server error: {err:?}"))
                } else {
                    ApiError::Unknown(String::from("Internal server error, see logs for details"))
                }
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Error {
        Error::Api(ApiError::Invalid(vec![FieldError {
            field: String::from("body"),
            message: rejection.body_text(),
        }]))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let err = self.for_client();
        (
            err.status_code(),
            [(header::CONTENT_TYPE, "application/json")],
            err.contents(),
        )
            .into_response()
    }
}
