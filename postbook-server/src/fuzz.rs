#![cfg(test)]

use std::{panic::AssertUnwindSafe, path::Path};

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{self, request, Method, StatusCode},
    Router,
};
use bolero::generator::TypeGenerator;
use postbook_api::{
    service, AuthToken, Author, Comment, Error as ApiError, Like, Post, PostId, PostList,
    PostStore, Removed, SinglePost, User, UserId, Uuid,
};
use postbook_mock_server::MockServer;
use tower::ServiceExt;

use crate::{db::PostgresDb, extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn parts_with_auth(auth: &str) -> Option<request::Parts> {
    http::Request::builder()
        .method(http::Method::GET)
        .uri("/posts")
        .header(http::header::AUTHORIZATION, auth)
        .body(())
        .ok()
        .map(|req| req.into_parts().0)
}

do_tokio_test!(fuzz_token_extractor, String, |token: String| async move {
    if let Some(mut req) = parts_with_auth(&token) {
        let res = Token::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::Unauthenticated)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

do_tokio_test!(fuzz_token_accepts_any_bearer_uuid, u128, |raw: u128| async move {
    let uuid = Uuid::from_u128(raw);
    for scheme in ["Bearer", "bearer", "BEARER"] {
        let mut req = parts_with_auth(&format!("{scheme} {uuid}")).expect("building request");
        match Token::from_request_parts(&mut req, &()).await {
            Ok(Token(tok)) => assert_eq!(tok.0, uuid),
            Err(e) => panic!("refused well-formed token {uuid}: {e}"),
        }
    }
});

#[tokio::test]
async fn missing_header_is_unauthenticated() {
    let mut req = http::Request::builder()
        .uri("/posts")
        .body(())
        .unwrap()
        .into_parts()
        .0;
    assert!(matches!(
        Token::from_request_parts(&mut req, &()).await,
        Err(Error::Api(ApiError::Unauthenticated))
    ));
}

fn find_pg_runtime() -> Option<postgresfixture::runtime::Runtime> {
    let mut best = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            let newer = match &best {
                Some((_, best_version)) => v > *best_version,
                None => true,
            };
            if newer {
                best = Some((r, v));
            }
        }
    }
    best.map(|(r, _)| r)
}

/// Runs `f` with the url of an empty database in a throw-away cluster
///
/// Returns `None` without running `f` when no cluster can be started here,
/// eg. postgres is not installed.
fn with_test_db<R>(name: &str, f: impl FnOnce(String) -> R) -> Option<R> {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
    let Some(runtime) = find_pg_runtime() else {
        eprintln!("skipping {name}: postgresql seems to not be installed in path");
        return None;
    };
    let lockfile = tempfile::tempfile().expect("creating tempfile");
    let datadir = tempfile::tempdir().expect("creating tempdir");
    let datadir_path: &Path = datadir.as_ref();
    let cluster = postgresfixture::cluster::Cluster::new(datadir_path, runtime);
    let url = format!(
        "postgresql://?host={}&dbname=test_db",
        datadir_path.to_str().expect("tempdir is not valid utf8")
    );
    let res = postgresfixture::coordinate::run_and_destroy(
        &cluster,
        lockfile.into(),
        AssertUnwindSafe(|| {
            cluster.createdb("test_db").expect("creating test_db database");
            f(url)
        }),
    );
    match res {
        Ok(r) => Some(r),
        Err(e) => {
            eprintln!("skipping {name}: failed starting a postgresql cluster: {e:?}");
            None
        }
    }
}

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed initializing tokio runtime")
}

async fn migrated_pool(url: &str) -> sqlx::PgPool {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(url)
        .await
        .expect("creating sqlx pool");
    MIGRATOR
        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
        .await
        .expect("failed applying migrations");
    pool
}

async fn reset_db(pool: &sqlx::PgPool) {
    let mut conn = pool.acquire().await.expect("getting db cleanup connection");
    sqlx::query(include_str!("../reset-test-db.sql"))
        .execute(&mut *conn)
        .await
        .expect("failed cleaning up database");
}

/// Runs a test once against a freshly migrated database
macro_rules! do_sqlx_test {
    ( $name:ident, $fn:expr ) => {
        #[test]
        fn $name() {
            with_test_db(stringify!($name), |url| {
                test_runtime().block_on(async move {
                    let pool = migrated_pool(&url).await;
                    let () = $fn(pool).await;
                })
            });
        }
    };

    // fuzzed version, the database is emptied between runs
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            with_test_db(stringify!($name), |url| {
                let runtime = AssertUnwindSafe(test_runtime());
                let pool = AssertUnwindSafe(runtime.block_on(migrated_pool(&url)));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let res = {
                            let pool: sqlx::PgPool = (*pool).clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool, v).await;
                                })
                            }))
                        };
                        runtime.block_on(reset_db(&pool));
                        if let Err(e) = res {
                            std::panic::resume_unwind(e);
                        }
                    });
            });
        }
    };
}

/// Inserts a user directly, skipping the password hashing of registration
async fn insert_user(conn: &mut sqlx::PgConnection, name: &str) -> Author {
    let author = Author {
        id: UserId(Uuid::new_v4()),
        name: String::from(name),
        avatar: format!("https://avatars.example/{name}.png"),
    };
    sqlx::query(
        "
            INSERT INTO users (id, name, email, avatar, password_hash, created_at)
            VALUES ($1, $2, $3, $4, 'not-a-hash', $5)
        ",
    )
    .bind(author.id.0)
    .bind(&author.name)
    .bind(format!("{}@example.org", author.id.0))
    .bind(&author.avatar)
    .bind(postbook_api::now())
    .execute(conn)
    .await
    .expect("inserting test user");
    author
}

do_sqlx_test!(posts_read_back_as_written, |pool: sqlx::PgPool| async move {
    let mut conn = pool.acquire().await.unwrap();
    let alice = insert_user(&mut conn, "alice").await;
    let bob = insert_user(&mut conn, "bob").await;
    let mut db = PostgresDb { conn: &mut *conn };

    let post = service::create_post(&mut db, &alice, String::from("hello"))
        .await
        .unwrap();
    service::like_post(&mut db, post.id, bob.id)
        .await
        .unwrap()
        .unwrap();
    let likes = service::like_post(&mut db, post.id, alice.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        likes,
        vec![Like { user_id: alice.id }, Like { user_id: bob.id }]
    );
    let first = service::add_comment(&mut db, post.id, &bob, String::from("first"))
        .await
        .unwrap()
        .unwrap();
    let comments = service::add_comment(&mut db, post.id, &bob, String::from("second"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(comments[1], first[0]);

    let stored = service::get_post(&mut db, post.id).await.unwrap().unwrap();
    assert_eq!(stored.created_at, post.created_at);
    assert_eq!(stored.likes, likes);
    assert_eq!(stored.comments, comments);
    assert_eq!(
        stored,
        Post {
            likes,
            comments,
            ..post.clone()
        }
    );

    let newer = service::create_post(&mut db, &bob, String::from("newer"))
        .await
        .unwrap();
    let posts = service::list_posts(&mut db).await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0], newer);
    assert_eq!(posts[1], stored);
});

do_sqlx_test!(concurrent_likes_are_serialized, |pool: sqlx::PgPool| async move {
    let mut conn = pool.acquire().await.unwrap();
    let alice = insert_user(&mut conn, "alice").await;
    let bob = insert_user(&mut conn, "bob").await;
    let post = Post::now(&alice, String::from("hello"));
    PostgresDb { conn: &mut *conn }
        .insert_post(&post)
        .await
        .unwrap();

    let (mut c1, mut c2) = (pool.acquire().await.unwrap(), pool.acquire().await.unwrap());
    let mut d1 = PostgresDb { conn: &mut *c1 };
    let mut d2 = PostgresDb { conn: &mut *c2 };
    let (r1, r2) = tokio::join!(
        service::like_post(&mut d1, post.id, bob.id),
        service::like_post(&mut d2, post.id, bob.id),
    );
    let mut results = vec![r1.unwrap(), r2.unwrap()];
    results.sort_by_key(|r| r.is_err());
    assert_eq!(
        results,
        vec![Ok(vec![Like { user_id: bob.id }]), Err(ApiError::AlreadyLiked)]
    );

    let stored = PostgresDb { conn: &mut *conn }
        .fetch_post(post.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.likes, vec![Like { user_id: bob.id }]);
});

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<AuthToken>,
    body: Option<&str>,
) -> (StatusCode, Vec<u8>) {
    let mut req = http::Request::builder().method(method).uri(uri);
    if let Some(tok) = token {
        req = req.header(http::header::AUTHORIZATION, format!("Bearer {}", tok.0));
    }
    let req = match body {
        Some(body) => req
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned())),
        None => req.body(Body::empty()),
    };
    let res = app
        .clone()
        .oneshot(req.expect("building request"))
        .await
        .expect("routing request");
    let status = res.status();
    let body = hyper::body::to_bytes(res.into_body())
        .await
        .expect("reading response body");
    (status, body.to_vec())
}

async fn call_ok<T: serde::de::DeserializeOwned>(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<AuthToken>,
    body: Option<&str>,
) -> T {
    let (status, res) = call(app, method.clone(), uri, token, body).await;
    assert_eq!(
        status,
        StatusCode::OK,
        "{method} {uri}: {}",
        String::from_utf8_lossy(&res)
    );
    serde_json::from_slice(&res).expect("parsing response body")
}

async fn call_err(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<AuthToken>,
    body: Option<&str>,
) -> (StatusCode, ApiError) {
    let (status, res) = call(app, method, uri, token, body).await;
    (status, ApiError::parse(&res).expect("parsing error body"))
}

fn registration(name: &str) -> String {
    serde_json::json!({
        "name": name,
        "email": format!("{name}@example.org"),
        "password": "secret-password",
        "avatar": format!("https://avatars.example/{name}.png"),
    })
    .to_string()
}

do_sqlx_test!(like_unlike_delete_over_http, |pool: sqlx::PgPool| async move {
    let app = app(AppState { pool });
    let a: AuthToken =
        call_ok(&app, Method::POST, "/users", None, Some(&registration("alice"))).await;
    let b: AuthToken =
        call_ok(&app, Method::POST, "/users", None, Some(&registration("bob"))).await;
    let bob: User = call_ok(&app, Method::GET, "/profile/me", Some(b), None).await;
    assert_eq!(bob.name, "bob");

    let bad_body = Some("{\"text\": 5}");
    let (status, err) = call_err(&app, Method::POST, "/posts", Some(a), bad_body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        matches!(&err, ApiError::Invalid(errs) if errs[0].field == "body"),
        "{err:?}"
    );

    let post: Post = call_ok(
        &app,
        Method::POST,
        "/posts",
        Some(a),
        Some("{\"text\": \"hello\"}"),
    )
    .await;
    let like_uri = format!("/posts/like/{}", post.id.0);
    let likes: Vec<Like> = call_ok(&app, Method::PUT, &like_uri, Some(b), None).await;
    assert_eq!(likes, vec![Like { user_id: bob.id }]);
    assert_eq!(
        call_err(&app, Method::PUT, &like_uri, Some(b), None).await,
        (StatusCode::BAD_REQUEST, ApiError::AlreadyLiked)
    );

    let unlike_uri = format!("/posts/unlike/{}", post.id.0);
    let likes: Vec<Like> = call_ok(&app, Method::PUT, &unlike_uri, Some(b), None).await;
    assert!(likes.is_empty());

    let comments: Vec<Comment> = call_ok(
        &app,
        Method::POST,
        &format!("/posts/comment/{}", post.id.0),
        Some(b),
        Some("{\"text\": \"nice\"}"),
    )
    .await;
    assert_eq!(comments[0].author_id, bob.id);

    let post_uri = format!("/posts/{}", post.id.0);
    assert_eq!(
        call_err(&app, Method::DELETE, &post_uri, Some(b), None).await,
        (StatusCode::UNAUTHORIZED, ApiError::PermissionDenied)
    );
    let SinglePost { post: stored } = call_ok(&app, Method::GET, &post_uri, Some(b), None).await;
    assert_eq!(stored.comments, comments);
    assert_eq!(stored.created_at, post.created_at);

    let removed: Removed = call_ok(&app, Method::DELETE, &post_uri, Some(a), None).await;
    assert_eq!(removed.msg, "Post removed");
    assert_eq!(
        call_err(&app, Method::GET, &post_uri, Some(a), None).await,
        (StatusCode::NOT_FOUND, ApiError::PostNotFound)
    );
    let list: PostList = call_ok(&app, Method::GET, "/posts", Some(a), None).await;
    assert_eq!(list.count, 0);

    let (status, _) = call(&app, Method::POST, "/unauth", Some(b), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        call_err(&app, Method::GET, "/posts", Some(b), None).await,
        (StatusCode::UNAUTHORIZED, ApiError::Unauthenticated)
    );
});

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    Create { user: u8 },
    Like { user: u8, post: u8 },
    Unlike { user: u8, post: u8 },
    Comment { user: u8, post: u8 },
    Uncomment { user: u8, post: u8, comment: u8 },
    Delete { user: u8, post: u8 },
    Get { post: u8 },
    List,
}

/// Comment ids and times are drawn independently by each store
fn comparable_comments(comments: &[Comment]) -> Vec<(UserId, String)> {
    comments
        .iter()
        .map(|c| (c.author_id, c.text.clone()))
        .collect()
}

fn comparable(post: &Post) -> (Post, Vec<(UserId, String)>) {
    let comments = comparable_comments(&post.comments);
    (
        Post {
            comments: Vec::new(),
            ..post.clone()
        },
        comments,
    )
}

/// Applies the same operations to the mock store and to postgres and checks they agree
struct ComparativeFuzzer {
    mock: MockServer,
    conn: sqlx::pool::PoolConnection<sqlx::Postgres>,
    users: Vec<Author>,
    posts: Vec<PostId>,
    written: usize,
}

impl ComparativeFuzzer {
    async fn new(pool: sqlx::PgPool) -> ComparativeFuzzer {
        let mut conn = pool.acquire().await.expect("acquiring fuzzer connection");
        let mut users = Vec::new();
        for name in ["alice", "bob", "carol"] {
            users.push(insert_user(&mut conn, name).await);
        }
        ComparativeFuzzer {
            mock: MockServer::new(),
            conn,
            users,
            posts: Vec::new(),
            written: 0,
        }
    }

    fn user(&self, user: u8) -> Author {
        self.users[user as usize % self.users.len()].clone()
    }

    /// One past the known posts stands for a post that never existed
    fn post(&self, post: u8) -> PostId {
        self.posts
            .get(post as usize % (self.posts.len() + 1))
            .copied()
            .unwrap_or(PostId(Uuid::new_v4()))
    }

    fn text(&mut self) -> String {
        self.written += 1;
        format!("text {}", self.written)
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::Create { user } => {
                let author = self.user(user);
                let text = self.text();
                let post = Post::now(&author, text);
                let mut pg = PostgresDb { conn: &mut *self.conn };
                self.mock.insert_post(&post).await.unwrap();
                pg.insert_post(&post).await.unwrap();
                self.posts.push(post.id);
            }
            FuzzOp::Like { user, post } => {
                let (user, post) = (self.user(user).id, self.post(post));
                let mut pg = PostgresDb { conn: &mut *self.conn };
                let mock = service::like_post(&mut self.mock, post, user).await.unwrap();
                let pg = service::like_post(&mut pg, post, user).await.unwrap();
                assert_eq!(mock, pg);
            }
            FuzzOp::Unlike { user, post } => {
                let (user, post) = (self.user(user).id, self.post(post));
                let mut pg = PostgresDb { conn: &mut *self.conn };
                let mock = service::unlike_post(&mut self.mock, post, user)
                    .await
                    .unwrap();
                let pg = service::unlike_post(&mut pg, post, user).await.unwrap();
                assert_eq!(mock, pg);
            }
            FuzzOp::Comment { user, post } => {
                let (author, post) = (self.user(user), self.post(post));
                let text = self.text();
                let mut pg = PostgresDb { conn: &mut *self.conn };
                let mock = service::add_comment(&mut self.mock, post, &author, text.clone())
                    .await
                    .unwrap();
                let pg = service::add_comment(&mut pg, post, &author, text)
                    .await
                    .unwrap();
                assert_eq!(
                    mock.as_deref().map(comparable_comments),
                    pg.as_deref().map(comparable_comments)
                );
            }
            FuzzOp::Uncomment {
                user,
                post,
                comment,
            } => {
                let (user, post) = (self.user(user).id, self.post(post));
                let mut pg = PostgresDb { conn: &mut *self.conn };
                // both stores keep comments in the same order, so an index names the same comment
                let pick = |p: Option<Post>| {
                    let comments = p.map(|p| p.comments).unwrap_or_default();
                    comments
                        .get(comment as usize % (comments.len() + 1))
                        .map(|c| c.id)
                        .unwrap_or(postbook_api::CommentId(Uuid::new_v4()))
                };
                let mock_target = pick(self.mock.fetch_post(post).await.unwrap());
                let pg_target = pick(pg.fetch_post(post).await.unwrap());
                let mock = service::delete_comment(&mut self.mock, post, mock_target, user)
                    .await
                    .unwrap();
                let pg = service::delete_comment(&mut pg, post, pg_target, user)
                    .await
                    .unwrap();
                assert_eq!(
                    mock.as_deref().map(comparable_comments),
                    pg.as_deref().map(comparable_comments)
                );
            }
            FuzzOp::Delete { user, post } => {
                let (user, post) = (self.user(user).id, self.post(post));
                let mut pg = PostgresDb { conn: &mut *self.conn };
                let mock = service::delete_post(&mut self.mock, post, user)
                    .await
                    .unwrap();
                let pg = service::delete_post(&mut pg, post, user).await.unwrap();
                assert_eq!(mock, pg);
            }
            FuzzOp::Get { post } => {
                let post = self.post(post);
                let mut pg = PostgresDb { conn: &mut *self.conn };
                let mock = service::get_post(&mut self.mock, post).await.unwrap();
                let pg = service::get_post(&mut pg, post).await.unwrap();
                assert_eq!(mock.as_ref().map(comparable), pg.as_ref().map(comparable));
            }
            FuzzOp::List => {
                let mut pg = PostgresDb { conn: &mut *self.conn };
                let mut mock = service::list_posts(&mut self.mock).await.unwrap();
                let mut pg = service::list_posts(&mut pg).await.unwrap();
                for posts in [&mock, &pg] {
                    for w in posts.windows(2) {
                        assert!(w[0].created_at >= w[1].created_at);
                    }
                }
                // posts created within the same microsecond may come in any order
                mock.sort_by_key(|p| p.id);
                pg.sort_by_key(|p| p.id);
                assert_eq!(
                    mock.iter().map(comparable).collect::<Vec<_>>(),
                    pg.iter().map(comparable).collect::<Vec<_>>()
                );
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..50usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool).await;
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
