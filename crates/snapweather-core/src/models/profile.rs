use serde::{Deserialize, Serialize};

/// The signed-in user's account, as returned by `GET /account`.
///
/// `username` is `None` until the user picks one; uploads are refused until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Profile {
    #[serde(rename = "email_address")]
    pub email: String,
    #[serde(rename = "user_name", default)]
    pub username: Option<String>,
}

impl Profile {
    pub fn needs_username(&self) -> bool {
        self.username.is_none()
    }
}
