use crate::{Error, Time, UserId, Validator};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub created_at: Time,
}

/// The part of a user's profile that gets copied onto their posts and comments
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub avatar: String,
}

impl From<&User> for Author {
    fn from(u: &User) -> Author {
        Author {
            id: u.id,
            name: u.name.clone(),
            avatar: u.avatar.clone(),
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub avatar: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::default();
        v.required("name", &self.name, "Name is required");
        v.required("email", &self.email, "Please include a valid email");
        v.check(
            self.email.contains('@'),
            "email",
            "Please include a valid email",
        );
        v.check(
            self.password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            "Please enter a password with 6 or more characters",
        );
        v.no_null_byte("password", &self.password);
        v.no_null_byte("avatar", &self.avatar);
        v.finish()
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::default();
        if let Some(name) = &self.name {
            v.required("name", name, "Name is required");
        }
        if let Some(avatar) = &self.avatar {
            v.no_null_byte("avatar", avatar);
        }
        v.finish()
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(avatar) = &self.avatar {
            user.avatar = avatar.clone();
        }
    }
}
