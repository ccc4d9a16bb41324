use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use postbook_api::{
    AuthToken, Author, Comment, Error as ApiError, Like, NewSession, NewUser, Post, PostId,
    PostStore, ProfileUpdate, User, UserId, Uuid,
};
use sqlx::{postgres::PgRow, types::Json, Connection, Row};

use crate::Error;

pub struct PostgresDb<'a> {
    pub conn: &'a mut sqlx::PgConnection,
}

fn post_from_row(p: &PgRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: PostId(p.try_get("id").context("retrieving the id field")?),
        author_id: UserId(
            p.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        author_name: p
            .try_get("author_name")
            .context("retrieving the author_name field")?,
        author_avatar: p
            .try_get("author_avatar")
            .context("retrieving the author_avatar field")?,
        text: p.try_get("text").context("retrieving the text field")?,
        likes: p
            .try_get::<Json<Vec<Like>>, _>("likes")
            .context("retrieving the likes field")?
            .0,
        comments: p
            .try_get::<Json<Vec<Comment>>, _>("comments")
            .context("retrieving the comments field")?
            .0,
        created_at: p
            .try_get("created_at")
            .context("retrieving the created_at field")?,
    })
}

fn user_from_row(u: &PgRow) -> anyhow::Result<User> {
    Ok(User {
        id: UserId(u.try_get("id").context("retrieving the id field")?),
        name: u.try_get("name").context("retrieving the name field")?,
        email: u.try_get("email").context("retrieving the email field")?,
        avatar: u.try_get("avatar").context("retrieving the avatar field")?,
        created_at: u
            .try_get("created_at")
            .context("retrieving the created_at field")?,
    })
}

#[async_trait]
impl<'a> PostStore for PostgresDb<'a> {
    async fn insert_post(&mut self, post: &Post) -> anyhow::Result<()> {
        let res = sqlx::query(
            "
                INSERT INTO posts
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(post.id.0)
        .bind(post.author_id.0)
        .bind(&post.author_name)
        .bind(&post.author_avatar)
        .bind(&post.text)
        .bind(Json(&post.likes))
        .bind(Json(&post.comments))
        .bind(post.created_at)
        .execute(&mut *self.conn)
        .await
        .with_context(|| format!("inserting post {:?}", post.id))?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "insertion of post {:?} affected {} rows",
            post.id,
            res.rows_affected()
        );
        Ok(())
    }

    async fn list_posts(&mut self) -> anyhow::Result<Vec<Post>> {
        let mut rows = sqlx::query(
            "
                SELECT id, author_id, author_name, author_avatar, text, likes, comments, created_at
                    FROM posts
                ORDER BY created_at DESC
            ",
        )
        .fetch(&mut *self.conn);
        let mut posts = Vec::new();
        while let Some(p) = rows.try_next().await.context("querying posts table")? {
            posts.push(post_from_row(&p)?);
        }
        Ok(posts)
    }

    async fn fetch_post(&mut self, id: PostId) -> anyhow::Result<Option<Post>> {
        sqlx::query(
            "
                SELECT id, author_id, author_name, author_avatar, text, likes, comments, created_at
                    FROM posts
                WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("querying post {:?}", id))?
        .map(|p| post_from_row(&p))
        .transpose()
    }

    async fn remove_post(&mut self, id: PostId) -> anyhow::Result<bool> {
        Ok(sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting post {:?}", id))?
            .rows_affected()
            == 1)
    }

    async fn update_post<T, F>(&mut self, id: PostId, f: F) -> anyhow::Result<Result<T, ApiError>>
    where
        T: Send,
        F: Send + FnOnce(&mut Post) -> Result<T, ApiError>,
    {
        // rolled back on drop, ie. on every early return
        let mut tx = self
            .conn
            .begin()
            .await
            .context("starting post update transaction")?;
        let row = sqlx::query(
            "
                SELECT id, author_id, author_name, author_avatar, text, likes, comments, created_at
                    FROM posts
                WHERE id = $1
                FOR UPDATE
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("locking post {:?}", id))?;
        let mut post = match row {
            Some(p) => post_from_row(&p)?,
            None => return Ok(Err(ApiError::PostNotFound)),
        };
        let res = match f(&mut post) {
            Ok(res) => res,
            Err(e) => return Ok(Err(e)),
        };
        sqlx::query("UPDATE posts SET likes = $2, comments = $3 WHERE id = $1")
            .bind(id.0)
            .bind(Json(&post.likes))
            .bind(Json(&post.comments))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("updating post {:?}", id))?;
        tx.commit()
            .await
            .with_context(|| format!("committing update of post {:?}", id))?;
        Ok(Ok(res))
    }
}

async fn hash_password(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .context("joining password hashing task")?
        .context("hashing password")
}

async fn verify_password(password: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("joining password verification task")?
        .context("verifying password")
}

pub async fn create_user(
    conn: &mut sqlx::PgConnection,
    data: &NewUser,
) -> anyhow::Result<Result<UserId, ApiError>> {
    let id = UserId(Uuid::new_v4());
    let hash = hash_password(data.password.clone()).await?;
    let res = sqlx::query(
        "
            INSERT INTO users (id, name, email, avatar, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO NOTHING
        ",
    )
    .bind(id.0)
    .bind(&data.name)
    .bind(&data.email)
    .bind(&data.avatar)
    .bind(hash)
    .bind(postbook_api::now())
    .execute(conn)
    .await
    .with_context(|| format!("inserting user {:?}", id))?;
    if res.rows_affected() == 0 {
        return Ok(Err(ApiError::EmailAlreadyUsed(data.email.clone())));
    }
    Ok(Ok(id))
}

pub async fn open_session(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    device: &str,
) -> anyhow::Result<AuthToken> {
    let token = AuthToken(Uuid::new_v4());
    let now = Utc::now();
    sqlx::query("INSERT INTO sessions VALUES ($1, $2, $3, $4, $5)")
        .bind(token.0)
        .bind(user.0)
        .bind(device)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await
        .with_context(|| format!("opening session for user {:?}", user))?;
    Ok(token)
}

pub async fn login_user(
    conn: &mut sqlx::PgConnection,
    data: &NewSession,
) -> anyhow::Result<Option<AuthToken>> {
    let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = $1")
        .bind(&data.email)
        .fetch_optional(&mut *conn)
        .await
        .context("querying users table")?;
    let (user, hash) = match row {
        None => return Ok(None),
        Some(u) => (
            UserId(u.try_get("id").context("retrieving the id field")?),
            u.try_get::<String, _>("password_hash")
                .context("retrieving the password_hash field")?,
        ),
    };
    if !verify_password(data.password.clone(), hash).await? {
        return Ok(None);
    }
    Ok(Some(open_session(conn, user, &data.device).await?))
}

pub async fn logout_user(
    conn: &mut sqlx::PgConnection,
    token: &AuthToken,
) -> anyhow::Result<bool> {
    Ok(sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token.0)
        .execute(conn)
        .await
        .context("deleting session")?
        .rows_affected()
        == 1)
}

/// Touches the session and returns its owner, as it would be copied onto new posts
pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<Author, Error> {
    let row = sqlx::query(
        "
            UPDATE sessions s
            SET last_active = $2
            FROM users u
            WHERE s.id = $1 AND u.id = s.user_id
            RETURNING u.id, u.name, u.avatar
        ",
    )
    .bind(token.0)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
    .context("recovering session")?
    .ok_or(Error::unauthenticated())?;
    Ok(Author {
        id: UserId(row.try_get("id").context("retrieving the id field")?),
        name: row.try_get("name").context("retrieving the name field")?,
        avatar: row
            .try_get("avatar")
            .context("retrieving the avatar field")?,
    })
}

pub async fn fetch_user(
    conn: &mut sqlx::PgConnection,
    user: UserId,
) -> anyhow::Result<Option<User>> {
    sqlx::query("SELECT id, name, email, avatar, created_at FROM users WHERE id = $1")
        .bind(user.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("querying user {:?}", user))?
        .map(|u| user_from_row(&u))
        .transpose()
}

pub async fn update_profile(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    upd: &ProfileUpdate,
) -> anyhow::Result<Option<User>> {
    sqlx::query(
        "
            UPDATE users
            SET name = COALESCE($2, name), avatar = COALESCE($3, avatar)
            WHERE id = $1
            RETURNING id, name, email, avatar, created_at
        ",
    )
    .bind(user.0)
    .bind(upd.name.as_deref())
    .bind(upd.avatar.as_deref())
    .fetch_optional(conn)
    .await
    .with_context(|| format!("updating profile of user {:?}", user))?
    .map(|u| user_from_row(&u))
    .transpose()
}
