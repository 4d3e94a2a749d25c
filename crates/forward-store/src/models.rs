//! Queue data types.

use serde::{Deserialize, Serialize};

/// Retry budget given to messages that do not set one.
pub const DEFAULT_RETRIES: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An outbound HTTP message.
///
/// `id` is `None` until the store assigns one on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<i64>,
    pub url: String,
    pub body: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub headers: Vec<Header>,
    pub retries_left: i64,
}

impl Message {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            body: body.into(),
            username: None,
            password: None,
            headers: Vec::new(),
            retries_left: DEFAULT_RETRIES,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_retries(mut self, retries_left: i64) -> Self {
        self.retries_left = retries_left;
        self
    }
}
