use anyhow::Context;
use axum::{extract::Path, Json};
use postbook_api::{
    service, AuthToken, Comment, CommentId, Like, NewComment, NewPost, NewSession, NewUser, Post,
    PostId, PostList, ProfileUpdate, Removed, SinglePost, User, UserId,
};

use crate::{db, extractors::*, Error};

pub async fn register(
    Db(mut conn): Db,
    JsonBody(data): JsonBody<NewUser>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    let user = db::create_user(&mut *conn, &data)
        .await
        .with_context(|| format!("registering user {:?}", data.email))??;
    tracing::info!(?user, "registered new user");
    Ok(Json(
        db::open_session(&mut *conn, user, "registration")
            .await
            .with_context(|| format!("opening first session of {:?}", user))?,
    ))
}

pub async fn auth(
    Db(mut conn): Db,
    JsonBody(data): JsonBody<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    Ok(Json(
        db::login_user(&mut *conn, &data)
            .await
            .context("logging user in")?
            .ok_or(Error::invalid_credentials())?,
    ))
}

pub async fn unauth(Token(token): Token, Db(mut conn): Db) -> Result<(), Error> {
    if !db::logout_user(&mut *conn, &token).await? {
        return Err(Error::unauthenticated());
    }
    Ok(())
}

pub async fn whoami(Session { author, mut conn }: Session) -> Result<Json<User>, Error> {
    Ok(Json(
        db::fetch_user(&mut *conn, author.id)
            .await
            .with_context(|| format!("fetching user {:?}", author.id))?
            // sessions are deleted along with their user
            .ok_or(Error::unauthenticated())?,
    ))
}

pub async fn fetch_profile(
    Session { mut conn, .. }: Session,
    Path(id): Path<String>,
) -> Result<Json<User>, Error> {
    let id = UserId::parse(&id)?;
    Ok(Json(
        db::fetch_user(&mut *conn, id)
            .await
            .with_context(|| format!("fetching user {:?}", id))?
            .ok_or(postbook_api::Error::UserNotFound)?,
    ))
}

pub async fn update_profile(
    Session { author, mut conn }: Session,
    JsonBody(data): JsonBody<ProfileUpdate>,
) -> Result<Json<User>, Error> {
    data.validate()?;
    Ok(Json(
        db::update_profile(&mut *conn, author.id, &data)
            .await
            .with_context(|| format!("updating profile of {:?}", author.id))?
            .ok_or(Error::unauthenticated())?,
    ))
}

pub async fn create_post(
    Session { author, mut conn }: Session,
    JsonBody(data): JsonBody<NewPost>,
) -> Result<Json<Post>, Error> {
    data.validate()?;
    let mut db = db::PostgresDb { conn: &mut *conn };
    let post = service::create_post(&mut db, &author, data.text)
        .await
        .with_context(|| format!("creating post for {:?}", author.id))?;
    tracing::debug!(post = ?post.id, user = ?author.id, "created post");
    Ok(Json(post))
}

pub async fn list_posts(Session { author, mut conn }: Session) -> Result<Json<PostList>, Error> {
    let mut db = db::PostgresDb { conn: &mut *conn };
    Ok(Json(PostList::from(
        service::list_posts(&mut db)
            .await
            .with_context(|| format!("fetching post list for {:?}", author.id))?,
    )))
}

pub async fn get_post(
    Session { mut conn, .. }: Session,
    Path(id): Path<String>,
) -> Result<Json<SinglePost>, Error> {
    let id = PostId::parse(&id)?;
    let mut db = db::PostgresDb { conn: &mut *conn };
    let post = service::get_post(&mut db, id).await??;
    Ok(Json(SinglePost { post }))
}

pub async fn delete_post(
    Session { author, mut conn }: Session,
    Path(id): Path<String>,
) -> Result<Json<Removed>, Error> {
    let id = PostId::parse(&id)?;
    let mut db = db::PostgresDb { conn: &mut *conn };
    service::delete_post(&mut db, id, author.id).await??;
    tracing::debug!(post = ?id, user = ?author.id, "deleted post");
    Ok(Json(Removed {
        msg: String::from("Post removed"),
    }))
}

pub async fn like_post(
    Session { author, mut conn }: Session,
    Path(id): Path<String>,
) -> Result<Json<Vec<Like>>, Error> {
    let id = PostId::parse(&id)?;
    let mut db = db::PostgresDb { conn: &mut *conn };
    Ok(Json(service::like_post(&mut db, id, author.id).await??))
}

pub async fn unlike_post(
    Session { author, mut conn }: Session,
    Path(id): Path<String>,
) -> Result<Json<Vec<Like>>, Error> {
    let id = PostId::parse(&id)?;
    let mut db = db::PostgresDb { conn: &mut *conn };
    Ok(Json(service::unlike_post(&mut db, id, author.id).await??))
}

pub async fn add_comment(
    Session { author, mut conn }: Session,
    Path(id): Path<String>,
    JsonBody(data): JsonBody<NewComment>,
) -> Result<Json<Vec<Comment>>, Error> {
    data.validate()?;
    let id = PostId::parse(&id)?;
    let mut db = db::PostgresDb { conn: &mut *conn };
    Ok(Json(
        service::add_comment(&mut db, id, &author, data.text).await??,
    ))
}

pub async fn delete_comment(
    Session { author, mut conn }: Session,
    Path((id, comment)): Path<(String, String)>,
) -> Result<Json<Vec<Comment>>, Error> {
    let id = PostId::parse(&id)?;
    let comment = CommentId::parse(&comment)?;
    let mut db = db::PostgresDb { conn: &mut *conn };
    Ok(Json(
        service::delete_comment(&mut db, id, comment, author.id).await??,
    ))
}
