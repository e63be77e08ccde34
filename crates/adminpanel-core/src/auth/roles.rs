//! Role display derivation.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Roles checked for display, highest priority first.
const ROLE_PRIORITY: [(&str, RoleLabel); 3] = [
    ("admin", RoleLabel::Admin),
    ("editor", RoleLabel::Editor),
    ("user", RoleLabel::User),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fa,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Locale::En),
            "fa" | "persian" | "farsi" => Ok(Locale::Fa),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// The single role shown for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleLabel {
    Admin,
    Editor,
    User,
    Undefined,
}

impl RoleLabel {
    /// Derive the label from a role set: first of admin, editor, user that
    /// is present wins, otherwise `Undefined`.
    pub fn from_roles(roles: &BTreeSet<String>) -> Self {
        ROLE_PRIORITY
            .iter()
            .find(|(name, _)| roles.contains(*name))
            .map(|(_, label)| *label)
            .unwrap_or(RoleLabel::Undefined)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RoleLabel::Undefined)
    }

    pub fn text(&self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::En, RoleLabel::Admin) => "Admin",
            (Locale::En, RoleLabel::Editor) => "Editor",
            (Locale::En, RoleLabel::User) => "User",
            (Locale::En, RoleLabel::Undefined) => "Role undefined",
            (Locale::Fa, RoleLabel::Admin) => "ادمین",
            (Locale::Fa, RoleLabel::Editor) => "ویرایشگر",
            (Locale::Fa, RoleLabel::User) => "کاربر",
            (Locale::Fa, RoleLabel::Undefined) => "نقش تعریف نشده",
        }
    }
}
