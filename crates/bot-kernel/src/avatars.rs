//! Avatar list: who is present in a topic.
//!
//! Presence is one shared list of [`ActorIdentity`] documents. Adds and
//! removes are compare-and-swap retry loops so concurrent writers never lose
//! each other's updates.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::identity::ActorIdentity;
use crate::topic::{update_list, Registration, SharedList};

/// List holding the present actors of a topic.
pub const AVATAR_LIST: &str = "avatars";

/// Decode the present actors, skipping entries that are not identities.
pub fn present_actors(list: &dyn SharedList) -> Vec<ActorIdentity> {
    decode_actors(&list.items())
}

pub(crate) fn decode_actors(items: &[Value]) -> Vec<ActorIdentity> {
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(actor) => Some(actor),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed avatar entry");
                None
            }
        })
        .collect()
}

fn is_actor(item: &Value, actor: &ActorIdentity) -> bool {
    item.get("id").and_then(Value::as_str) == Some(actor.id.as_str())
}

/// Append `actor` to the presence list.
pub fn add_presence(list: &dyn SharedList, actor: &ActorIdentity) -> anyhow::Result<()> {
    let entry = serde_json::to_value(actor)?;
    update_list(list, |items| {
        let mut next = items.to_vec();
        next.push(entry.clone());
        Ok(next)
    })?;
    Ok(())
}

/// Remove every entry with `actor`'s id.
pub fn remove_presence(list: &dyn SharedList, actor: &ActorIdentity) -> anyhow::Result<()> {
    update_list(list, |items| {
        Ok(items
            .iter()
            .filter(|item| !is_actor(item, actor))
            .cloned()
            .collect())
    })?;
    Ok(())
}

/// Count present actors matching `predicate`.
pub fn count_where<P>(list: &dyn SharedList, predicate: P) -> usize
where
    P: Fn(&ActorIdentity) -> bool,
{
    present_actors(list)
        .iter()
        .filter(|actor| predicate(actor))
        .count()
}

/// Count present actors that are not bots.
pub fn real_count(list: &dyn SharedList) -> usize {
    count_where(list, |actor| !actor.is_synthetic())
}

/// Run `callback` whenever the presence list changes.
pub fn on_changed<F>(list: &dyn SharedList, callback: F) -> Registration
where
    F: Fn() + Send + Sync + 'static,
{
    list.subscribe(Arc::new(move |_: &[Value]| callback()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::{InMemoryTopicStore, TopicId, TopicStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn avatar_list() -> Arc<dyn SharedList> {
        InMemoryTopicStore::new().list(&TopicId::for_entity(7), AVATAR_LIST)
    }

    #[test]
    fn test_add_and_remove_by_identity() {
        let list = avatar_list();
        let ada = ActorIdentity::new("u-1", "Ada");
        let bot = ActorIdentity::new("bot-x", "Bot Tan");

        add_presence(list.as_ref(), &ada).unwrap();
        add_presence(list.as_ref(), &bot).unwrap();
        assert_eq!(count_where(list.as_ref(), |_| true), 2);
        assert_eq!(real_count(list.as_ref()), 1);

        // Equality is by id, not by the full document.
        let renamed = ActorIdentity::new("u-1", "Ada Lovelace");
        remove_presence(list.as_ref(), &renamed).unwrap();
        assert_eq!(present_actors(list.as_ref()), vec![bot]);
    }

    #[test]
    fn test_on_changed_fires_per_update() {
        let list = avatar_list();
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        let registration = on_changed(list.as_ref(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let ada = ActorIdentity::new("u-1", "Ada");
        add_presence(list.as_ref(), &ada).unwrap();
        remove_presence(list.as_ref(), &ada).unwrap();
        registration.remove();
        add_presence(list.as_ref(), &ada).unwrap();

        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }
}
