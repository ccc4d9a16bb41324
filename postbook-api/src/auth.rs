use crate::{Error, Uuid, Validator};

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,

    /// Free-form name of the device the session is opened from
    #[serde(default)]
    pub device: String,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), Error> {
        let mut v = Validator::default();
        v.required("email", &self.email, "Please include a valid email");
        v.required("password", &self.password, "Password is required");
        v.no_null_byte("device", &self.device);
        v.finish()
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);
