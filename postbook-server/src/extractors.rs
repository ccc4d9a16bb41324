use anyhow::Context;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{header, request, HeaderMap},
};
use postbook_api::{AuthToken, Author, Uuid};
use sqlx::{pool::PoolConnection, Postgres};

use crate::{db, Error};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
}

impl AppState {
    async fn conn(&self) -> Result<PoolConnection<Postgres>, Error> {
        Ok(self
            .pool
            .acquire()
            .await
            .context("acquiring db connection")?)
    }
}

/// Pooled connection for the routes that work without a session
pub struct Db(pub PoolConnection<Postgres>);

#[async_trait]
impl FromRequestParts<AppState> for Db {
    type Rejection = Error;

    async fn from_request_parts(_req: &mut request::Parts, state: &AppState) -> Result<Db, Error> {
        Ok(Db(state.conn().await?))
    }
}

/// Reads an `Authorization: Bearer <uuid>` header
///
/// Anything else, including a missing header, an unknown scheme or a token
/// that is not a uuid, is reported as `Unauthenticated`.
pub fn bearer_token(headers: &HeaderMap) -> Result<AuthToken, Error> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(Error::unauthenticated())?
        .to_str()
        .map_err(|_| Error::unauthenticated())?;
    let (scheme, token) = value.split_once(' ').ok_or(Error::unauthenticated())?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.contains(' ') {
        return Err(Error::unauthenticated());
    }
    Uuid::try_parse(token)
        .map(AuthToken)
        .map_err(|_| Error::unauthenticated())
}

/// Bearer token of the request, not yet checked against the sessions table
pub struct Token(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for Token {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<Token, Error> {
        bearer_token(&req.headers).map(Token)
    }
}

/// A request made within a live session
///
/// `conn` is the connection the session was looked up on. Handlers keep using
/// it, so an authenticated request never holds more than one pool connection.
pub struct Session {
    pub author: Author,
    pub conn: PoolConnection<Postgres>,
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<Session, Error> {
        // checked before touching the pool
        let token = bearer_token(&req.headers)?;
        let mut conn = state.conn().await?;
        let author = db::recover_session(&mut *conn, token).await?;
        Ok(Session { author, conn })
    }
}

/// JSON request body, rejected with a typed `invalid` error
///
/// Wrong content type, bad syntax and mismatched field types all answer 400
/// with a JSON body, like every other client error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct JsonBody<T>(pub T);
