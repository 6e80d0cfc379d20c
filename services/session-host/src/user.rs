//! Session user records.

use pairwise_id::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::UserError;

/// The user a session acts on behalf of.
///
/// Anonymous users carry no id. An identified user always has a non-empty
/// login and a full name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UserRecord", into = "UserRecord")]
pub struct User {
    id: Option<UserId>,
    login: Option<String>,
    full_name: Option<String>,
    source: Option<String>,
}

/// Unvalidated wire form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    id: Option<UserId>,
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

impl User {
    pub fn new(
        id: Option<UserId>,
        login: Option<String>,
        full_name: Option<String>,
        source: Option<String>,
    ) -> Result<Self, UserError> {
        if login.as_deref().is_some_and(str::is_empty) {
            return Err(UserError::EmptyLogin);
        }
        if let Some(id) = id {
            if login.is_none() {
                return Err(UserError::MissingField {
                    id: id.to_string(),
                    field: "login",
                });
            }
            if full_name.is_none() {
                return Err(UserError::MissingField {
                    id: id.to_string(),
                    field: "full_name",
                });
            }
        }
        Ok(Self {
            id,
            login,
            full_name,
            source,
        })
    }

    pub fn anonymous() -> Self {
        Self {
            id: None,
            login: None,
            full_name: None,
            source: None,
        }
    }

    /// Decodes and validates a user record.
    pub fn from_value(value: Value) -> Result<Self, UserError> {
        serde_json::from_value::<UserRecord>(value)
            .map_err(|e| UserError::Invalid(e.to_string()))
            .and_then(Self::try_from)
    }

    pub fn id(&self) -> Option<UserId> {
        self.id
    }

    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }

    pub fn describe(&self) -> Value {
        json!({
            "id": self.id,
            "login": self.login,
            "full_name": self.full_name,
            "source": self.source,
            "anonymous": self.is_anonymous(),
        })
    }
}

impl TryFrom<UserRecord> for User {
    type Error = UserError;

    fn try_from(record: UserRecord) -> Result<Self, Self::Error> {
        User::new(record.id, record.login, record.full_name, record.source)
    }
}

impl From<User> for UserRecord {
    fn from(user: User) -> Self {
        UserRecord {
            id: user.id,
            login: user.login,
            full_name: user.full_name,
            source: user.source,
        }
    }
}
