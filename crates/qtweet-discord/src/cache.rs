//! Guild/channel/role/member cache fed by gateway dispatches, and the
//! permission computation built on it.
//!
//! Permission resolution (per channel, per user):
//! 1. the guild owner gets everything
//! 2. base = `@everyone` role | every role of the member
//! 3. `ADMINISTRATOR` in base grants everything
//! 4. channel overwrites apply in order: `@everyone`, then the member's
//!    roles (denies aggregated, then allows), then the member itself

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use qtweet_core::types::{ChannelInfo, ChannelKind, GuildInfo};
use qtweet_core::Permissions;

// Discord channel types
const CHANNEL_GUILD_TEXT: u64 = 0;
const CHANNEL_DM: u64 = 1;
const CHANNEL_GUILD_ANNOUNCEMENT: u64 = 5;

// Overwrite target types
const OVERWRITE_ROLE: u64 = 0;
const OVERWRITE_MEMBER: u64 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overwrite {
    pub id: String,
    pub member: bool,
    pub allow: Permissions,
    pub deny: Permissions,
}

#[derive(Clone, Debug)]
struct CachedChannel {
    info: ChannelInfo,
    overwrites: Vec<Overwrite>,
}

#[derive(Clone, Debug)]
struct CachedGuild {
    info: GuildInfo,
    roles: HashMap<String, Permissions>,
    members: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct Cache {
    guilds: HashMap<String, CachedGuild>,
    channels: HashMap<String, CachedChannel>,
    /// Guilds announced by READY: their GUILD_CREATE isn't a join.
    pending: HashSet<String>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the guilds listed in READY.
    pub fn expect_guilds<I: IntoIterator<Item = String>>(&mut self, ids: I) {
        self.pending.extend(ids);
    }

    /// Cache a full guild payload. Returns `true` when the bot just joined it.
    pub fn upsert_guild(&mut self, data: &Value) -> Option<(GuildInfo, bool)> {
        let info = guild_from_wire(data)?;
        let joined = !self.pending.remove(&info.id) && !self.guilds.contains_key(&info.id);

        let mut roles = HashMap::new();
        for role in data["roles"].as_array().into_iter().flatten() {
            if let Some(id) = role["id"].as_str() {
                roles.insert(id.to_string(), perms_field(&role["permissions"]));
            }
        }

        let mut members = HashMap::new();
        for member in data["members"].as_array().into_iter().flatten() {
            if let Some(user_id) = member["user"]["id"].as_str() {
                members.insert(user_id.to_string(), role_ids(&member["roles"]));
            }
        }

        for channel in data["channels"].as_array().into_iter().flatten() {
            self.upsert_channel_in(channel, Some(&info.id));
        }

        self.guilds.insert(
            info.id.clone(),
            CachedGuild {
                info: info.clone(),
                roles,
                members,
            },
        );
        Some((info, joined))
    }

    /// Forget a guild and its channels. Returns what was known about it.
    pub fn remove_guild(&mut self, guild_id: &str) -> Option<GuildInfo> {
        self.pending.remove(guild_id);
        self.channels
            .retain(|_, c| c.info.guild_id.as_deref() != Some(guild_id));
        self.guilds.remove(guild_id).map(|g| g.info)
    }

    pub fn guild(&self, guild_id: &str) -> Option<GuildInfo> {
        self.guilds.get(guild_id).map(|g| g.info.clone())
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    pub fn upsert_channel(&mut self, data: &Value) -> Option<ChannelInfo> {
        self.upsert_channel_in(data, None)
    }

    fn upsert_channel_in(&mut self, data: &Value, guild_id: Option<&str>) -> Option<ChannelInfo> {
        let mut info = channel_from_wire(data)?;
        if info.guild_id.is_none() && info.kind != ChannelKind::DirectMessage {
            info.guild_id = guild_id.map(str::to_string);
        }

        let overwrites = data["permission_overwrites"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(overwrite_from_wire)
            .collect();

        self.channels.insert(
            info.id.clone(),
            CachedChannel {
                info: info.clone(),
                overwrites,
            },
        );
        Some(info)
    }

    pub fn remove_channel(&mut self, channel_id: &str) -> Option<ChannelInfo> {
        self.channels.remove(channel_id).map(|c| c.info)
    }

    pub fn channel(&self, channel_id: &str) -> Option<ChannelInfo> {
        self.channels.get(channel_id).map(|c| c.info.clone())
    }

    pub fn upsert_role(&mut self, guild_id: &str, role: &Value) {
        let (Some(guild), Some(id)) = (self.guilds.get_mut(guild_id), role["id"].as_str()) else {
            return;
        };
        guild
            .roles
            .insert(id.to_string(), perms_field(&role["permissions"]));
    }

    pub fn remove_role(&mut self, guild_id: &str, role_id: &str) {
        if let Some(guild) = self.guilds.get_mut(guild_id) {
            guild.roles.remove(role_id);
        }
    }

    /// Record the roles of a guild member.
    pub fn upsert_member(&mut self, guild_id: &str, user_id: &str, roles: &Value) {
        if let Some(guild) = self.guilds.get_mut(guild_id) {
            guild.members.insert(user_id.to_string(), role_ids(roles));
        }
    }

    pub fn remove_member(&mut self, guild_id: &str, user_id: &str) {
        if let Some(guild) = self.guilds.get_mut(guild_id) {
            guild.members.remove(user_id);
        }
    }

    /// Effective permissions of `user_id` in a guild channel.
    ///
    /// `None` when the channel or its guild isn't cached. DMs have no
    /// permission model and also yield `None`.
    pub fn permissions_in(&self, channel_id: &str, user_id: &str) -> Option<Permissions> {
        let channel = self.channels.get(channel_id)?;
        let guild = self.guilds.get(channel.info.guild_id.as_deref()?)?;

        if guild.info.owner_id.as_deref() == Some(user_id) {
            return Some(Permissions::ALL);
        }

        let guild_id = guild.info.id.as_str();
        let member_roles = guild.members.get(user_id).cloned().unwrap_or_default();

        let mut perms = guild.roles.get(guild_id).copied().unwrap_or_default();
        for role in &member_roles {
            if let Some(role_perms) = guild.roles.get(role) {
                perms |= *role_perms;
            }
        }
        if perms.contains(Permissions::ADMINISTRATOR) {
            return Some(Permissions::ALL);
        }

        if let Some(everyone) = channel
            .overwrites
            .iter()
            .find(|o| !o.member && o.id == guild_id)
        {
            perms = (perms & !everyone.deny) | everyone.allow;
        }

        let mut allow = Permissions::NONE;
        let mut deny = Permissions::NONE;
        for overwrite in channel
            .overwrites
            .iter()
            .filter(|o| !o.member && member_roles.contains(&o.id))
        {
            allow |= overwrite.allow;
            deny |= overwrite.deny;
        }
        perms = (perms & !deny) | allow;

        if let Some(member) = channel
            .overwrites
            .iter()
            .find(|o| o.member && o.id == user_id)
        {
            perms = (perms & !member.deny) | member.allow;
        }

        Some(perms)
    }
}

// ─────────────────────────────────────────────
// Wire parsing
// ─────────────────────────────────────────────

pub fn guild_from_wire(data: &Value) -> Option<GuildInfo> {
    Some(GuildInfo {
        id: data["id"].as_str()?.to_string(),
        name: data["name"].as_str().unwrap_or_default().to_string(),
        owner_id: data["owner_id"].as_str().map(str::to_string),
    })
}

pub fn channel_from_wire(data: &Value) -> Option<ChannelInfo> {
    let id = data["id"].as_str()?.to_string();
    let kind = match data["type"].as_u64() {
        Some(CHANNEL_GUILD_TEXT) | Some(CHANNEL_GUILD_ANNOUNCEMENT) => ChannelKind::GuildText,
        Some(CHANNEL_DM) => ChannelKind::DirectMessage,
        _ => ChannelKind::Other,
    };
    let recipient_id = data["recipients"][0]["id"].as_str().map(str::to_string);

    Some(ChannelInfo {
        id,
        kind,
        name: data["name"].as_str().unwrap_or_default().to_string(),
        guild_id: data["guild_id"].as_str().map(str::to_string),
        recipient_id,
    })
}

fn overwrite_from_wire(data: &Value) -> Option<Overwrite> {
    let member = match data["type"].as_u64() {
        Some(OVERWRITE_ROLE) => false,
        Some(OVERWRITE_MEMBER) => true,
        _ => return None,
    };
    Some(Overwrite {
        id: data["id"].as_str()?.to_string(),
        member,
        allow: perms_field(&data["allow"]),
        deny: perms_field(&data["deny"]),
    })
}

/// Permission fields are decimal strings on the wire.
fn perms_field(value: &Value) -> Permissions {
    match value {
        Value::String(s) => Permissions::from_wire(s),
        Value::Number(n) => Permissions(n.as_u64().unwrap_or(0)),
        _ => Permissions::NONE,
    }
}

fn role_ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|r| r.as_str().map(str::to_string))
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VIEW_SEND: u64 = (1 << 10) | (1 << 11);

    fn guild_payload() -> Value {
        json!({
            "id": "g1",
            "name": "Test guild",
            "owner_id": "owner",
            "roles": [
                { "id": "g1", "permissions": VIEW_SEND.to_string() },
                { "id": "mods", "permissions": (1u64 << 4).to_string() },
                { "id": "admins", "permissions": (1u64 << 3).to_string() },
                { "id": "muted", "permissions": "0" }
            ],
            "members": [
                { "user": { "id": "bot" }, "roles": [] },
                { "user": { "id": "mod" }, "roles": ["mods"] },
                { "user": { "id": "admin" }, "roles": ["admins"] },
                { "user": { "id": "quiet" }, "roles": ["muted"] }
            ],
            "channels": [
                { "id": "c1", "type": 0, "name": "general" },
                {
                    "id": "c2", "type": 0, "name": "readonly",
                    "permission_overwrites": [
                        { "id": "g1", "type": 0, "allow": "0", "deny": (1u64 << 11).to_string() },
                        { "id": "mods", "type": 0, "allow": (1u64 << 11).to_string(), "deny": "0" }
                    ]
                },
                {
                    "id": "c3", "type": 0, "name": "muted",
                    "permission_overwrites": [
                        { "id": "muted", "type": 0, "allow": "0", "deny": VIEW_SEND.to_string() },
                        { "id": "quiet", "type": 1, "allow": (1u64 << 10).to_string(), "deny": "0" }
                    ]
                },
                { "id": "v1", "type": 2, "name": "voice" }
            ]
        })
    }

    fn cache() -> Cache {
        let mut cache = Cache::new();
        cache.upsert_guild(&guild_payload()).unwrap();
        cache
    }

    #[test]
    fn test_upsert_guild_joined_flag() {
        let mut cache = Cache::new();
        cache.expect_guilds(vec!["g1".to_string()]);
        let (_, joined) = cache.upsert_guild(&guild_payload()).unwrap();
        assert!(!joined);

        let mut fresh = Cache::new();
        let (info, joined) = fresh.upsert_guild(&guild_payload()).unwrap();
        assert!(joined);
        assert_eq!(info.owner_id.as_deref(), Some("owner"));

        // Seen again (e.g. after an outage): not a join
        let (_, joined) = fresh.upsert_guild(&guild_payload()).unwrap();
        assert!(!joined);
    }

    #[test]
    fn test_guild_channels_inherit_guild_id() {
        let cache = cache();
        let c1 = cache.channel("c1").unwrap();
        assert_eq!(c1.guild_id.as_deref(), Some("g1"));
        assert_eq!(c1.kind, ChannelKind::GuildText);
        assert_eq!(cache.channel("v1").unwrap().kind, ChannelKind::Other);
    }

    #[test]
    fn test_everyone_base_permissions() {
        let cache = cache();
        let perms = cache.permissions_in("c1", "bot").unwrap();
        assert!(perms.can_post());
        assert!(!perms.can_post_embed());
        assert!(!perms.is_moderator());
    }

    #[test]
    fn test_owner_and_admin_get_everything() {
        let cache = cache();
        assert_eq!(cache.permissions_in("c2", "owner"), Some(Permissions::ALL));
        assert_eq!(cache.permissions_in("c2", "admin"), Some(Permissions::ALL));
    }

    #[test]
    fn test_everyone_overwrite_then_role_overwrite() {
        let cache = cache();
        assert!(!cache.permissions_in("c2", "bot").unwrap().can_post());
        let mod_perms = cache.permissions_in("c2", "mod").unwrap();
        assert!(mod_perms.can_post());
        assert!(mod_perms.is_moderator());
    }

    #[test]
    fn test_member_overwrite_wins_over_role() {
        let cache = cache();
        let perms = cache.permissions_in("c3", "quiet").unwrap();
        assert!(perms.contains(Permissions::VIEW_CHANNEL));
        assert!(!perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_unknown_member_uses_everyone() {
        let cache = cache();
        assert!(cache.permissions_in("c1", "stranger").unwrap().can_post());
        assert_eq!(cache.permissions_in("nope", "bot"), None);
    }

    #[test]
    fn test_role_and_member_updates() {
        let mut cache = cache();
        cache.upsert_role("g1", &json!({ "id": "embedders", "permissions": ((1u64 << 14) | (1u64 << 15)).to_string() }));
        cache.upsert_member("g1", "bot", &json!(["embedders"]));
        assert!(cache.permissions_in("c1", "bot").unwrap().can_post_embed());

        cache.remove_role("g1", "embedders");
        assert!(!cache.permissions_in("c1", "bot").unwrap().can_post_embed());

        cache.upsert_member("g1", "quiet", &json!([]));
        cache.remove_member("g1", "quiet");
        assert!(cache.permissions_in("c1", "quiet").unwrap().can_post());
    }

    #[test]
    fn test_remove_guild_drops_channels() {
        let mut cache = cache();
        let info = cache.remove_guild("g1").unwrap();
        assert_eq!(info.name, "Test guild");
        assert!(cache.channel("c1").is_none());
        assert_eq!(cache.guild_count(), 0);
    }

    #[test]
    fn test_channel_lifecycle() {
        let mut cache = cache();
        let info = cache
            .upsert_channel(&json!({ "id": "c9", "type": 0, "guild_id": "g1", "name": "new" }))
            .unwrap();
        assert_eq!(info.name, "new");
        assert!(cache.permissions_in("c9", "bot").unwrap().can_post());
        assert_eq!(cache.remove_channel("c9").unwrap().id, "c9");
        assert!(cache.channel("c9").is_none());
    }

    #[test]
    fn test_dm_channel_from_wire() {
        let info = channel_from_wire(&json!({
            "id": "d1", "type": 1, "recipients": [{ "id": "u1", "username": "someone" }]
        }))
        .unwrap();
        assert!(info.is_dm());
        assert_eq!(info.recipient_id.as_deref(), Some("u1"));
    }
}
