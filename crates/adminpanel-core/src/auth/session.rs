use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::roles::RoleLabel;
use super::token::jwt_expiry;

/// Session lifetime when neither the token nor the provider states one.
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

/// Buffer time before expiry to trigger refresh (5 minutes)
const SESSION_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Identity of the signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserIdentity {
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    #[cfg_attr(feature = "ts", ts(type = "string[]"))]
    pub role: BTreeSet<String>,
}

impl UserIdentity {
    pub fn role_label(&self) -> RoleLabel {
        RoleLabel::from_roles(&self.role)
    }
}

/// Accept `"admin"`, `["admin", "user"]` or `null` for the role field.
fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(role)) => BTreeSet::from([role]),
        Some(OneOrMany::Many(roles)) => roles.into_iter().collect(),
        None => BTreeSet::new(),
    })
}

/// An authenticated session: the bearer token plus who it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    pub token: String,
    pub user: UserIdentity,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Build a session issued now. Expiry comes from the token's `exp`
    /// claim, then the provider's `expires_in`, then the default TTL.
    pub fn issue(token: String, user: UserIdentity, expires_in_secs: Option<i64>) -> Self {
        let created_at = Utc::now();
        let expires_at = jwt_expiry(&token)
            .or_else(|| expires_in_secs.map(|secs| created_at + Duration::seconds(secs)))
            .unwrap_or_else(|| created_at + Duration::minutes(DEFAULT_SESSION_TTL_MINUTES));
        Self {
            token,
            user,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        Utc::now() >= self.expires_at - Duration::minutes(SESSION_REFRESH_BUFFER_MINUTES)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_minutes().max(0)
    }
}

#[cfg(test)]
pub(crate) fn test_identity(roles: &[&str]) -> UserIdentity {
    UserIdentity {
        id: "8864c717-587d-472a-929a-8e5f298024da-0".to_string(),
        display_name: "Jaydon Frankie".to_string(),
        photo_url: Some("/assets/images/avatar/avatar-25.webp".to_string()),
        role: roles.iter().map(|r| r.to_string()).collect(),
    }
}
