//! Synthetic actor identities.
//!
//! Every participant in a topic is an [`ActorIdentity`]. Bots carry a reserved
//! id prefix so any consumer can tell real and synthetic actors apart by
//! looking at the id alone.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id prefix of field-edit bots (the per-entity "main" pool).
pub const EDIT_BOT_PREFIX: &str = "bot-";

/// Id prefix of roaming presence bots.
pub const ROAMING_BOT_PREFIX: &str = "pr-bot-";

/// Names handed out round-robin to generated bots.
pub const BOT_NAMES: [&str; 6] = ["Jens", "Leif", "Tan", "Pekka", "Yuriy", "Serhii"];

/// A participant in a shared topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl ActorIdentity {
    /// Identity of a real (non-bot) participant.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
        }
    }

    /// Same identity with the given avatar reference.
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// True for any bot, whichever pool it belongs to.
    pub fn is_synthetic(&self) -> bool {
        is_synthetic_id(&self.id)
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Classify an actor id as synthetic by its prefix.
pub fn is_synthetic_id(id: &str) -> bool {
    id.starts_with(EDIT_BOT_PREFIX) || id.starts_with(ROAMING_BOT_PREFIX)
}

/// Avatar image for the `index`-th bot of a pool of `avatar_count` images.
///
/// Main bots count up from the first image, roaming bots count down from the
/// last one, so the two pools rarely share a face.
pub fn avatar_path(index: usize, avatar_count: usize, descending: bool) -> String {
    let count = avatar_count.max(1);
    let number = if descending {
        count - (index % count)
    } else {
        (index % count) + 1
    };
    format!("images/avatars/{number}.png")
}

/// Generates bot identities with names cycling through [`BOT_NAMES`].
#[derive(Debug, Default)]
pub struct IdentityGenerator {
    counter: AtomicUsize,
}

impl IdentityGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh identity whose id starts with `prefix`.
    pub fn generate(&self, prefix: &str) -> ActorIdentity {
        let slot = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % BOT_NAMES.len())
            })
            .unwrap_or_default();

        ActorIdentity {
            id: format!("{prefix}{}", Uuid::new_v4()),
            name: format!("Bot {}", BOT_NAMES[slot]),
            avatar: None,
        }
    }

    /// Generate `count` identities with avatars assigned by position.
    pub fn generate_pool(
        &self,
        prefix: &str,
        count: usize,
        avatar_count: usize,
        descending_avatars: bool,
    ) -> Vec<ActorIdentity> {
        (0..count)
            .map(|i| {
                self.generate(prefix)
                    .with_avatar(avatar_path(i, avatar_count, descending_avatars))
            })
            .collect()
    }
}
