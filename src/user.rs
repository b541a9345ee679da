//! User record and account payloads exchanged with the backend
//!
//! Field names on the wire follow the dashboard backend (`rol`, `nombre`,
//! `apellidos`, `created_at`); camelCase spellings are accepted as aliases.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::SessionError;

/// Minimum accepted length for a new password
pub const MIN_PASSWORD_LEN: usize = 6;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The authenticated user as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,

    pub username: String,

    /// Raw role text; use [`User::role`] for the normalized value
    #[serde(rename = "rol", alias = "role", default)]
    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        rename = "nombre",
        alias = "firstName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub first_name: Option<String>,

    #[serde(
        rename = "apellidos",
        alias = "lastName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_name: Option<String>,

    #[serde(
        alias = "createdAt",
        default,
        with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<NaiveDateTime>,
}

impl User {
    /// Create a user with only the mandatory fields set
    pub fn new<S: Into<String>, R: Into<String>>(id: i64, username: S, role: R) -> Self {
        Self {
            id,
            username: username.into(),
            role: role.into(),
            email: None,
            first_name: None,
            last_name: None,
            created_at: None,
        }
    }

    /// Normalized role
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    /// "First Last" when known, otherwise the username
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => self.username.clone(),
        }
    }

    /// Overwrite the fields present in `update`, leaving the rest untouched
    pub fn merge(&mut self, update: &UserUpdate) {
        if let Some(username) = &update.username {
            self.username = username.clone();
        }
        if let Some(role) = &update.role {
            self.role = role.clone();
        }
        if let Some(email) = &update.email {
            self.email = Some(email.clone());
        }
        if let Some(first_name) = &update.first_name {
            self.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &update.last_name {
            self.last_name = Some(last_name.clone());
        }
    }
}

/// Partial user record, as sent by the profile screen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(rename = "rol", alias = "role", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        rename = "nombre",
        alias = "firstName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub first_name: Option<String>,

    #[serde(
        rename = "apellidos",
        alias = "lastName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_name: Option<String>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_username<S: Into<String>>(mut self, username: S) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_role<S: Into<String>>(mut self, role: S) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_first_name<S: Into<String>>(mut self, name: S) -> Self {
        self.first_name = Some(name.into());
        self
    }

    pub fn with_last_name<S: Into<String>>(mut self, name: S) -> Self {
        self.last_name = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Login form payload
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Password change form
///
/// Only the current and new password are sent; the confirmation is checked
/// locally by [`PasswordChange::validate`].
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    #[serde(skip)]
    pub confirm_password: String,
}

impl PasswordChange {
    pub fn new<C, N, R>(current: C, new: N, confirm: R) -> Self
    where
        C: Into<String>,
        N: Into<String>,
        R: Into<String>,
    {
        Self {
            current_password: current.into(),
            new_password: new.into(),
            confirm_password: confirm.into(),
        }
    }

    /// Check the form before it reaches the network
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.new_password != self.confirm_password {
            return Err(SessionError::Validation(
                "Las contraseñas no coinciden".to_string(),
            ));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SessionError::Validation(format!(
                "La contraseña debe tener al menos {} caracteres",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordChange").finish_non_exhaustive()
    }
}

/// Normalized dashboard role
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Operator,
    Viewer,
    Other(String),
}

impl Role {
    /// Parse the backend's free-form role text.
    ///
    /// Exact names win, then case-insensitive substrings. An empty role is
    /// treated as the least privileged one.
    pub fn parse(raw: &str) -> Role {
        match raw {
            "admin" | "Administrador" => return Role::Admin,
            "operador" => return Role::Operator,
            "viewer" => return Role::Viewer,
            _ => {}
        }

        let lower = raw.to_lowercase();
        if lower.contains("admin") {
            Role::Admin
        } else if lower.contains("operador") {
            Role::Operator
        } else if lower.contains("viewer") {
            Role::Viewer
        } else {
            Role::Other(raw.to_string())
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &str {
        match self {
            Role::Admin => "Administrador",
            Role::Operator => "Operador",
            Role::Viewer => "Solo Consulta",
            Role::Other(raw) => raw,
        }
    }

    /// Sort key for role pickers
    pub fn order(&self) -> u8 {
        match self {
            Role::Admin => 1,
            Role::Operator => 2,
            Role::Viewer => 3,
            Role::Other(_) => 99,
        }
    }

    /// The roles offered in selects, in display order
    pub fn options() -> Vec<Role> {
        vec![Role::Admin, Role::Operator, Role::Viewer]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sidebar entry
#[derive(Debug, Clone, PartialEq)]
pub struct NavItem {
    pub path: String,
    pub label: String,
    pub roles: Vec<Role>,
}

impl NavItem {
    pub fn new<P: Into<String>, L: Into<String>>(path: P, label: L, roles: Vec<Role>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            roles,
        }
    }

    /// Default dashboard navigation
    pub fn sidebar() -> Vec<NavItem> {
        vec![
            NavItem::new("/", "Dashboard", Role::options()),
            NavItem::new("/orders", "Órdenes", Role::options()),
            NavItem::new("/configuracion", "Configuración", Role::options()),
        ]
    }

    /// Whether `role` may see this entry
    pub fn allows(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

/// Entries visible to `user`; no user counts as a viewer
pub fn visible_items<'a>(items: &'a [NavItem], user: Option<&User>) -> Vec<&'a NavItem> {
    let role = user.map(User::role).unwrap_or(Role::Viewer);
    items.iter().filter(|item| item.allows(&role)).collect()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok())
}

// The PHP backend sends ids as numbers or numeric strings.
fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid user id: {:?}", text))),
    }
}

mod lenient_timestamp {
    use super::*;

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&ts.format(TIMESTAMP_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse_timestamp(text)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {:?}", text))),
        }
    }
}
