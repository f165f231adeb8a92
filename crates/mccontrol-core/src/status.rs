//! Status-ping properties document and the shared status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    pub name: String,
    pub protocol: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSample {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Players {
    pub max: i64,
    pub online: i64,
    pub sample: Vec<PlayerSample>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionPart {
    pub text: String,
    pub color: Option<String>,
}

/// Server description: either a plain string or a formatted text object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Plain(String),
    Formatted {
        #[serde(default)]
        text: String,
        #[serde(default)]
        extra: Vec<DescriptionPart>,
    },
}

impl Default for Description {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

impl Description {
    /// Flattened text: the base text followed by every extra part.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Plain(text) => text.clone(),
            Self::Formatted { text, extra } => {
                let mut out = text.clone();
                for part in extra {
                    out.push_str(&part.text);
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModEntry {
    #[serde(rename = "modid")]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "modList")]
    pub mod_list: Vec<ModEntry>,
}

/// Properties document returned by a status ping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerProperties {
    pub version: VersionInfo,
    pub players: Players,
    pub description: Description,
    pub favicon: String,
    #[serde(rename = "modinfo")]
    pub mod_info: ModInfo,
}

impl ServerProperties {
    /// Decode a raw properties document.
    ///
    /// # Errors
    /// Returns the decoding error if the document has an incompatible shape.
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// Last observed state of the game server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub online: bool,
    pub latency_ms: u64,
    pub players_online: i64,
    pub players_max: i64,
    pub version: String,
    pub description: String,
    pub instance_name: String,
    pub phase: String,
    pub cluster_address: String,
    pub external_address: Option<String>,
    pub last_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Copy identity fields.
    pub fn apply_identity(&mut self, identity: &Identity) {
        self.instance_name.clone_from(&identity.instance_name);
        self.phase = identity.phase.to_string();
        self.cluster_address.clone_from(&identity.address);
        self.external_address.clone_from(&identity.external_address);
    }

    /// Record a successful ping.
    pub fn apply_ping(&mut self, properties: &ServerProperties, latency_ms: u64) {
        self.online = true;
        self.latency_ms = latency_ms;
        self.players_online = properties.players.online;
        self.players_max = properties.players.max;
        if !properties.version.name.is_empty() {
            self.version.clone_from(&properties.version.name);
        }
        let description = properties.description.text();
        if !description.is_empty() {
            self.description = description;
        }
        self.last_error = None;
        self.last_checked_at = Some(Utc::now());
    }

    /// Record a failed ping.
    pub fn mark_offline(&mut self, error: impl Into<String>) {
        self.online = false;
        self.last_error = Some(error.into());
        self.last_checked_at = Some(Utc::now());
    }
}
