use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authentication boundary. Students and users live in separate tables, so a
/// session in one scope can never resolve an account of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Student,
    User,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// Role stored in `users.role_id`. Registration always assigns `Student`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn id(self) -> i64 {
        match self {
            Self::Admin => 1,
            Self::Student => 2,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Admin),
            2 => Some(Self::Student),
            _ => None,
        }
    }
}

// -- JWT Claims --

/// Claims carried by the session token. `sid` points at the server-side
/// session row, which is what logout deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub scope: Scope,
    pub sid: Uuid,
    pub exp: usize,
}

/// Authenticated request context, resolved by the scope middleware and passed
/// explicitly into every service call.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub scope: Scope,
    pub account_id: Uuid,
    pub csrf_token: String,
}
