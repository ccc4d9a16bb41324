use std::collections::{btree_map, BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use postbook_api::{
    Author, AuthToken, Error, NewSession, NewUser, Post, PostId, PostStore, ProfileUpdate, User,
    UserId, Uuid,
};

/// In-memory stand-in for the server and its database
#[derive(Debug, Default)]
pub struct MockServer {
    users: BTreeMap<UserId, DbUser>,
    posts: BTreeMap<PostId, Post>,
}

#[derive(Debug)]
struct DbUser {
    user: User,
    // tests (of which mock-server is a part of) don't actually use bcrypt
    pass: String,
    sessions: HashMap<AuthToken, Device>,
}

#[derive(Debug)]
struct Device(String);

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::default()
    }

    /// Return the current number of users
    pub fn test_num_users(&self) -> usize {
        self.users.len()
    }

    fn open_session(&mut self, user: UserId, device: String) -> Result<AuthToken, Error> {
        let u = self.users.get_mut(&user).ok_or(Error::UserNotFound)?;
        let tok = AuthToken(Uuid::new_v4());
        u.sessions.insert(tok, Device(device));
        Ok(tok)
    }

    pub fn register(&mut self, u: NewUser) -> Result<AuthToken, Error> {
        u.validate()?;

        if self.users.values().any(|db| db.user.email == u.email) {
            return Err(Error::EmailAlreadyUsed(u.email));
        }

        let id = UserId(Uuid::new_v4());
        match self.users.entry(id) {
            btree_map::Entry::Occupied(_) => {
                return Err(Error::Unknown(format!("uuid collision on {id:?}")))
            }
            btree_map::Entry::Vacant(entry) => {
                entry.insert(DbUser {
                    user: User {
                        id,
                        name: u.name,
                        email: u.email,
                        avatar: u.avatar,
                        created_at: Utc::now(),
                    },
                    pass: u.password,
                    sessions: HashMap::new(),
                });
            }
        }
        self.open_session(id, String::from("registration"))
    }

    pub fn auth(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate()?;
        let id = self
            .users
            .values()
            .find(|u| u.user.email == s.email && u.pass == s.password)
            .map(|u| u.user.id)
            .ok_or(Error::InvalidCredentials)?;
        self.open_session(id, s.device)
    }

    fn resolve(&self, tok: AuthToken) -> Result<&DbUser, Error> {
        self.users
            .values()
            .find(|u| u.sessions.contains_key(&tok))
            .ok_or(Error::Unauthenticated)
    }

    pub fn unauth(&mut self, tok: AuthToken) -> Result<(), Error> {
        for u in self.users.values_mut() {
            if u.sessions.remove(&tok).is_some() {
                return Ok(());
            }
        }
        Err(Error::Unauthenticated)
    }

    pub fn whoami(&self, tok: AuthToken) -> Result<UserId, Error> {
        Ok(self.resolve(tok)?.user.id)
    }

    /// Profile data of `tok`'s user, as copied onto posts and comments
    pub fn author(&self, tok: AuthToken) -> Result<Author, Error> {
        Ok(Author::from(&self.resolve(tok)?.user))
    }

    pub fn fetch_user(&self, id: UserId) -> Result<User, Error> {
        self.users
            .get(&id)
            .map(|u| u.user.clone())
            .ok_or(Error::UserNotFound)
    }

    pub fn update_profile(&mut self, tok: AuthToken, upd: ProfileUpdate) -> Result<User, Error> {
        upd.validate()?;
        let id = self.whoami(tok)?;
        let u = self.users.get_mut(&id).ok_or(Error::UserNotFound)?;
        upd.apply(&mut u.user);
        Ok(u.user.clone())
    }
}

#[async_trait]
impl PostStore for MockServer {
    async fn insert_post(&mut self, post: &Post) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.posts.contains_key(&post.id),
            "post {:?} already exists",
            post.id
        );
        self.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn list_posts(&mut self) -> anyhow::Result<Vec<Post>> {
        let mut posts = self.posts.values().cloned().collect::<Vec<_>>();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn fetch_post(&mut self, id: PostId) -> anyhow::Result<Option<Post>> {
        Ok(self.posts.get(&id).cloned())
    }

    async fn remove_post(&mut self, id: PostId) -> anyhow::Result<bool> {
        Ok(self.posts.remove(&id).is_some())
    }

    async fn update_post<T, F>(&mut self, id: PostId, f: F) -> anyhow::Result<Result<T, Error>>
    where
        T: Send,
        F: Send + FnOnce(&mut Post) -> Result<T, Error>,
    {
        let post = match self.posts.get_mut(&id) {
            Some(post) => post,
            None => return Ok(Err(Error::PostNotFound)),
        };
        let mut updated = post.clone();
        match f(&mut updated) {
            Ok(res) => {
                *post = updated;
                Ok(Ok(res))
            }
            Err(e) => Ok(Err(e)),
        }
    }
}
