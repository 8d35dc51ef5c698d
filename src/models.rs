use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity ---

/// Role
///
/// The fixed set of staff roles on the platform. Each role owns one dashboard subtree;
/// membership in that subtree's route set is the only authorization signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Admin,
    HeadWriter,
    LeagueOperator,
    Writer,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Admin,
        Role::HeadWriter,
        Role::LeagueOperator,
        Role::Writer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::HeadWriter => "head_writer",
            Role::LeagueOperator => "league_operator",
            Role::Writer => "writer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a profile carries a role string outside the known set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s.trim())
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// User
///
/// A row of the `profiles` table, keyed by the identity provider's user id. The
/// `role` column is free text in the database and is parsed on use.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

impl User {
    /// The parsed role, or `None` when the column holds an unrecognized value.
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

/// AuthIdentity
///
/// What the identity provider answers for a valid session: who the caller is and,
/// if the profile maps to a known role, what they may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthIdentity {
    pub id: Uuid,
    pub role: Option<Role>,
}

/// Session
///
/// Request-scoped authentication state. Created by the session resolver for every
/// request and dropped with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated { user_id: Uuid, role: Option<Role> },
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Session::Authenticated { role, .. } => *role,
            Session::Anonymous => None,
        }
    }
}

impl From<Option<AuthIdentity>> for Session {
    fn from(identity: Option<AuthIdentity>) -> Self {
        match identity {
            Some(AuthIdentity { id, role }) => Session::Authenticated { user_id: id, role },
            None => Session::Anonymous,
        }
    }
}

// --- Login API Schemas ---

/// LoginRequest
///
/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// LoginResponse
///
/// Returned on a successful sign-in. The session itself travels in the `Set-Cookie`
/// headers; `redirect_to` is where the client should navigate next.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub role: Option<Role>,
    pub redirect_to: String,
}
