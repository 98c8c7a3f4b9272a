//! Gateway Intents
//!
//! Intents are a bitfield that controls which events the gateway sends.
//! Some intents are "privileged" and require approval in the developer portal.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Gateway Intents control which events Discord sends to your bot.
    ///
    /// The flag set is closed: only the names below exist, occupying bits
    /// 0 through 14 of the mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        /// Includes events for guild creation, update, delete, role changes, etc.
        const GUILDS = 1 << 0;

        /// Includes events for member joins, updates, removes.
        /// **PRIVILEGED INTENT** - Requires approval in the developer portal.
        const GUILD_MEMBERS = 1 << 1;

        /// Includes events for guild bans.
        const GUILD_BANS = 1 << 2;

        /// Includes events for emoji updates.
        const GUILD_EMOJIS = 1 << 3;

        /// Includes events for integration updates.
        const GUILD_INTEGRATIONS = 1 << 4;

        /// Includes events for webhook updates.
        const GUILD_WEBHOOKS = 1 << 5;

        /// Includes events for invite creation/deletion.
        const GUILD_INVITES = 1 << 6;

        /// Includes events for voice state updates.
        const GUILD_VOICE_STATES = 1 << 7;

        /// Includes events for user presence updates.
        /// **PRIVILEGED INTENT** - Requires approval in the developer portal.
        const GUILD_PRESENCES = 1 << 8;

        /// Includes events for messages in guilds.
        const GUILD_MESSAGES = 1 << 9;

        /// Includes events for message reactions in guilds.
        const GUILD_MESSAGE_REACTIONS = 1 << 10;

        /// Includes events for typing indicators in guilds.
        const GUILD_MESSAGE_TYPING = 1 << 11;

        /// Includes events for direct messages.
        const DIRECT_MESSAGES = 1 << 12;

        /// Includes events for DM reactions.
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;

        /// Includes events for DM typing indicators.
        const DIRECT_MESSAGE_TYPING = 1 << 14;

        /// Intents that require approval (gateway close 4014 without it).
        const PRIVILEGED = Self::GUILD_MEMBERS.bits() | Self::GUILD_PRESENCES.bits();
    }
}

impl Default for Intents {
    /// Every intent except the privileged ones.
    fn default() -> Self {
        Self::all().difference(Self::PRIVILEGED)
    }
}

impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u64::deserialize(deserializer)?;
        Ok(Intents::from_bits_truncate(bits))
    }
}
