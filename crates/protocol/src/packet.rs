use crate::request::Request;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One server-to-agent message. All fields except `request` are optional;
/// which ones are populated depends on the request kind.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Packet {
    pub request: Request,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talk_history: Option<Vec<Talk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_history: Option<Vec<Talk>>,
}

impl Packet {
    /// A packet carrying nothing but a request kind.
    pub fn of(request: Request) -> Self {
        Self {
            request,
            info: None,
            setting: None,
            talk_history: None,
            whisper_history: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Werewolf,
    Possessed,
    Seer,
    Bodyguard,
    Villager,
    Medium,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Alive,
    Dead,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Species {
    Human,
    Werewolf,
}

/// A divine or medium result.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Judge {
    pub day: u32,
    pub agent: String,
    pub target: String,
    pub result: Species,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Vote {
    pub day: u32,
    pub agent: String,
    pub target: String,
}

/// Game state snapshot.
///
/// Two shapes travel under this one type. A *full* snapshot (phase start,
/// daily initialize) carries the per-agent `status_map`/`role_map`; a
/// *partial* snapshot (each realtime broadcast) carries only identity
/// fields and `remain_count`. [`Info::is_full`] tells them apart.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Info {
    pub game_id: String,
    pub day: u32,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium_result: Option<Judge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divine_result: Option<Judge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacked_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_list: Option<Vec<Vote>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_vote_list: Option<Vec<Vote>>,
    #[serde(default)]
    pub status_map: HashMap<String, Status>,
    #[serde(default)]
    pub role_map: HashMap<String, Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remain_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remain_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remain_skip: Option<u32>,
}

impl Info {
    /// A full snapshot carries the status map; a partial one never does.
    pub fn is_full(&self) -> bool {
        !self.status_map.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
pub struct MaxCount {
    #[serde(default)]
    pub per_agent: u32,
    #[serde(default)]
    pub per_day: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TalkSetting {
    #[serde(default)]
    pub max_count: MaxCount,
    #[serde(default)]
    pub max_skip: u32,
}

/// Server-side deadlines, in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
pub struct TimeoutSetting {
    #[serde(default)]
    pub action: u64,
    #[serde(default)]
    pub response: u64,
}

/// The subset of the server's game settings an agent consumes. Unknown
/// fields on the wire are ignored.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Setting {
    #[serde(default)]
    pub agent_count: u32,
    #[serde(default)]
    pub role_num_map: HashMap<Role, u32>,
    #[serde(default)]
    pub vote_visibility: bool,
    #[serde(default)]
    pub talk_on_first_day: bool,
    #[serde(default)]
    pub talk: TalkSetting,
    #[serde(default)]
    pub whisper: TalkSetting,
    #[serde(default)]
    pub timeout: TimeoutSetting,
}

/// One utterance in a talk or whisper log. Append-only; `idx` is the
/// server-assigned ordering position.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Talk {
    pub idx: u32,
    pub day: u32,
    pub turn: u32,
    pub agent: String,
    pub text: String,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub over: bool,
}
