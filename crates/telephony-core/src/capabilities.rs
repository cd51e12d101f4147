//! Capability and property bitsets
//!
//! Capabilities describe what the user may do with a call or conference
//! (hold, merge, swap...). Properties describe what the call *is* (HD audio,
//! carried over Wi-Fi, downgraded from an IMS conference...). Both are plain
//! `u32` newtypes so they can be copied freely between connections and
//! conferences.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

macro_rules! bitset {
    ($name:ident { $($(#[$meta:meta])* $flag:ident = $bit:expr,)* }) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            $($(#[$meta])* pub const $flag: $name = $name(1 << $bit);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn bits(&self) -> u32 {
                self.0
            }

            pub const fn contains(&self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(&self) -> bool {
                self.0 == 0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }

            /// Insert or remove depending on `value`
            pub fn set(&mut self, other: $name, value: bool) {
                if value {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }

            /// Copy the `mask` bits from `source`, leaving the rest untouched
            pub fn mirror(&mut self, source: $name, mask: $name) {
                self.0 = (self.0 & !mask.0) | (source.0 & mask.0);
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut names = Vec::new();
                $(if self.contains($name::$flag) { names.push(stringify!($flag)); })*
                write!(f, "{}[{}]", stringify!($name), names.join(" | "))
            }
        }
    };
}

bitset!(Capabilities {
    HOLD = 0,
    SUPPORT_HOLD = 1,
    /// Two calls may be merged into a conference
    MERGE_CONFERENCE = 2,
    /// The user may swap between the active and held call
    SWAP_CONFERENCE = 3,
    MUTE = 6,
    /// Participants can be managed individually
    MANAGE_CONFERENCE = 7,
    SEPARATE_FROM_CONFERENCE = 12,
    DISCONNECT_FROM_CONFERENCE = 13,
    VIDEO_LOCAL_BIDIRECTIONAL = 8,
    VIDEO_REMOTE_BIDIRECTIONAL = 10,
    CAN_UPGRADE_TO_VIDEO = 19,
    CAN_PAUSE_VIDEO = 20,
    CANNOT_DOWNGRADE_VIDEO_TO_AUDIO = 23,
    /// The conference exposes no child connections to accessories
    CONFERENCE_HAS_NO_CHILDREN = 21,
});

bitset!(Properties {
    /// Conference hosted by the network
    CONFERENCE_HOST = 0,
    HIGH_DEF_AUDIO = 2,
    WIFI = 3,
    /// Call lives on another device
    IS_EXTERNAL_CALL = 4,
    EMERGENCY_CALLBACK_MODE = 5,
    /// Circuit-switched leg left behind by an SRVCC'd IMS conference
    IS_DOWNGRADED_CONFERENCE = 6,
    /// Virtual roster participant with no radio leg of its own
    IS_PARTICIPANT = 7,
});

impl Capabilities {
    /// Video capabilities a conference may inherit from its host
    pub const VIDEO_REMOTE_MASK: Capabilities =
        Capabilities(Self::VIDEO_REMOTE_BIDIRECTIONAL.0 | Self::CAN_UPGRADE_TO_VIDEO.0);
}

impl Properties {
    /// Properties an IMS conference copies verbatim from its host
    pub const HOST_MIRRORED: Properties =
        Properties(Self::HIGH_DEF_AUDIO.0 | Self::WIFI.0 | Self::IS_EXTERNAL_CALL.0);
}
