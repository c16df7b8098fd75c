use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Clinic role carried by the token. `app_metadata` wins over `user_metadata`,
    /// which wins over the top-level claim (Supabase sets that one to "authenticated").
    pub fn clinic_role(&self) -> UserRole {
        let from_metadata = |metadata: &Option<serde_json::Value>| {
            metadata
                .as_ref()
                .and_then(|m| m.get("role"))
                .and_then(|r| r.as_str())
                .and_then(|r| r.parse::<UserRole>().ok())
        };

        from_metadata(&self.app_metadata)
            .or_else(|| from_metadata(&self.user_metadata))
            .or_else(|| self.role.as_deref().and_then(|r| r.parse().ok()))
            .unwrap_or(UserRole::Patient)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Professional,
    Patient,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Professional => write!(f, "professional"),
            UserRole::Patient => write!(f, "patient"),
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "professional" | "doctor" => Ok(UserRole::Professional),
            "patient" => Ok(UserRole::Patient),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// String field from user metadata, e.g. `professional_id` or `patient_id`.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}
