use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{AsRefStr, Display, EnumString};

/// Kinds of entity the store can resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
}

/// Chat identity of a user on the realtime backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    pub jabber_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserImage {
    pub resolution: String,
    pub image_uri: String,
}

/// Directory user, the sender of messages and occupant of rooms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub chat: Option<ChatInfo>,
    #[serde(default)]
    pub images: Vec<UserImage>,
}

impl User {
    /// Creates a user with only an id and display name set
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            username: None,
            display_name: Some(display_name.into()),
            title: None,
            email: None,
            department: None,
            organization_id: None,
            chat: None,
            images: Vec::new(),
        }
    }

    /// Best available human-readable name
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .or(self.username.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Group chat backing a `group` room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }
}

/// The entity a room is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    User(Arc<User>),
    Group(Arc<Group>),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::User,
            Entity::Group(_) => EntityKind::Group,
        }
    }

    pub fn as_user(&self) -> Option<&Arc<User>> {
        match self {
            Entity::User(user) => Some(user),
            Entity::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Arc<Group>> {
        match self {
            Entity::Group(group) => Some(group),
            Entity::User(_) => None,
        }
    }
}
