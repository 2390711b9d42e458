//! Presence tracking and the edit actor handoff.
//!
//! Real actors are simulated by writing straight into a topic's avatar list,
//! exactly as a person's editor would.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use bot_kernel::avatars::{self, AVATAR_LIST};
use bot_kernel::identity::{IdentityGenerator, EDIT_BOT_PREFIX, ROAMING_BOT_PREFIX};
use bot_kernel::{
    ActorIdentity, EditActor, InMemoryTopicStore, PresenceActor, RoamingPresenceActor, TopicId,
    TopicStore,
};

use common::{context, store, NoteRepository};

fn bot() -> ActorIdentity {
    IdentityGenerator::new().generate(EDIT_BOT_PREFIX)
}

fn person(n: usize) -> ActorIdentity {
    ActorIdentity::new(format!("user-{n}"), format!("Person {n}"))
}

#[test]
fn test_concurrent_presence_updates_are_not_lost() {
    let store = store();
    let list = store.list(&TopicId::for_entity(1), AVATAR_LIST);
    let barrier = Arc::new(Barrier::new(12));

    let handles: Vec<_> = (0..12)
        .map(|n| {
            let list = Arc::clone(&list);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let actor = person(n);
                barrier.wait();
                // Calls alternate add/remove; odd totals end present.
                for call in 0..(n % 4 + 1) {
                    if call % 2 == 0 {
                        avatars::add_presence(list.as_ref(), &actor).unwrap();
                    } else {
                        avatars::remove_presence(list.as_ref(), &actor).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut present: Vec<String> = avatars::present_actors(list.as_ref())
        .into_iter()
        .map(|actor| actor.id)
        .collect();
    present.sort();
    let mut expected: Vec<String> = (0..12)
        .filter(|n| (n % 4 + 1) % 2 == 1)
        .map(|n| person(n).id)
        .collect();
    expected.sort();
    assert_eq!(present, expected);
}

#[test]
fn test_edit_actor_follows_real_actors() {
    let store = store();
    let repository = NoteRepository::with_notes([42]);
    let context = context(Arc::clone(&store), repository);
    let bot = bot();
    let actor = PresenceActor::start(Arc::clone(&context), 42, bot.clone(), false);
    let list = store.list(&TopicId::for_entity(42), AVATAR_LIST);

    assert!(!actor.has_real_actors());
    assert!(actor.edit_actor().is_none());

    avatars::add_presence(list.as_ref(), &person(1)).unwrap();
    assert!(actor.has_real_actors());
    let edit_actor = actor.edit_actor().expect("edit actor after first join");
    assert!(edit_actor.is_connected());
    assert!(avatars::present_actors(list.as_ref()).contains(&bot));

    // A second person and a repeated join change nothing.
    avatars::add_presence(list.as_ref(), &person(2)).unwrap();
    avatars::add_presence(list.as_ref(), &person(2)).unwrap();
    assert_eq!(context.registry.created_count(), 1);
    assert_eq!(actor.real_actor_count(), 2);

    avatars::remove_presence(list.as_ref(), &person(1)).unwrap();
    assert!(actor.has_real_actors());
    assert!(!edit_actor.is_stopped());

    avatars::remove_presence(list.as_ref(), &person(2)).unwrap();
    assert!(!actor.has_real_actors());
    assert!(edit_actor.is_stopped());
    assert!(!edit_actor.is_connected());
    assert!(actor.edit_actor().is_none());

    // Coming back starts a fresh actor.
    avatars::add_presence(list.as_ref(), &person(3)).unwrap();
    assert_eq!(context.registry.created_count(), 2);
    actor.close();
    assert!(context.registry.is_empty());
}

#[test]
fn test_bots_never_count_as_real_actors() {
    let store = store();
    let context = context(Arc::clone(&store), NoteRepository::with_notes([5]));
    let actor = PresenceActor::start(Arc::clone(&context), 5, bot(), true);
    let list = store.list(&TopicId::for_entity(5), AVATAR_LIST);

    let generator = IdentityGenerator::new();
    avatars::add_presence(list.as_ref(), &generator.generate(EDIT_BOT_PREFIX)).unwrap();
    avatars::add_presence(list.as_ref(), &generator.generate(ROAMING_BOT_PREFIX)).unwrap();

    assert!(actor.is_present());
    assert!(!actor.has_real_actors());
    assert_eq!(context.registry.created_count(), 0);
    assert_eq!(avatars::real_count(list.as_ref()), 0);
}

#[test]
fn test_racing_joins_create_one_edit_actor() {
    let store = store();
    let context = context(Arc::clone(&store), NoteRepository::with_notes([7]));
    let _actor = PresenceActor::start(Arc::clone(&context), 7, bot(), false);
    let list = store.list(&TopicId::for_entity(7), AVATAR_LIST);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let list = Arc::clone(&list);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                avatars::add_presence(list.as_ref(), &person(n)).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(context.registry.created_count(), 1);
    assert_eq!(context.registry.len(), 1);
}

#[test]
fn test_registry_creates_once_under_contention() {
    let store = store();
    let repository = NoteRepository::with_notes([3]);
    let context = context(Arc::clone(&store), Arc::clone(&repository));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let context = Arc::clone(&context);
            let repository = Arc::clone(&repository);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let (_, created) = context.registry.get_or_create(3, || {
                    EditActor::spawn(
                        &context.store,
                        repository.note(3),
                        IdentityGenerator::new().generate(EDIT_BOT_PREFIX),
                        Arc::clone(&context.repository),
                        Arc::clone(&context.catalog),
                        context.settings.clone(),
                        ChaCha8Rng::seed_from_u64(1),
                    )
                });
                created
            })
        })
        .collect();
    let created = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|created| *created)
        .count();

    assert_eq!(created, 1);
    assert_eq!(context.registry.created_count(), 1);
}

#[test]
fn test_toggle_skips_watched_entity() {
    let store = store();
    let context = context(Arc::clone(&store), NoteRepository::with_notes([4]));
    let actor = PresenceActor::start(Arc::clone(&context), 4, bot(), false);
    let list = store.list(&TopicId::for_entity(4), AVATAR_LIST);

    assert!(actor.toggle_if_unwatched(true).unwrap());
    assert!(actor.is_present());
    assert!(actor.toggle_if_unwatched(false).unwrap());
    assert!(!actor.is_present());

    avatars::add_presence(list.as_ref(), &person(1)).unwrap();
    assert!(actor.is_present());
    assert!(!actor.toggle_if_unwatched(false).unwrap());
    assert!(actor.is_present());
    assert_eq!(avatars::present_actors(list.as_ref()).len(), 2);
    actor.close();
}

#[test]
fn test_hiding_never_follows_a_racing_join() {
    for round in 0..200 {
        let store = store();
        let context = context(Arc::clone(&store), NoteRepository::with_notes([5]));
        let actor = PresenceActor::start(Arc::clone(&context), 5, bot(), true);
        let list = store.list(&TopicId::for_entity(5), AVATAR_LIST);
        let barrier = Arc::new(Barrier::new(2));

        let joiner = {
            let list = Arc::clone(&list);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                avatars::add_presence(list.as_ref(), &person(round)).unwrap();
            })
        };
        let toggler = {
            let actor = Arc::clone(&actor);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                actor.toggle_if_unwatched(false).unwrap();
            })
        };
        joiner.join().unwrap();
        toggler.join().unwrap();

        assert!(actor.has_real_actors());
        assert!(actor.is_present(), "bot hidden while watched in round {round}");
        assert_eq!(avatars::count_where(list.as_ref(), |a| a.id == actor.actor().id), 1);
        actor.close();
        context.registry.stop_all();
    }
}

#[test]
fn test_missing_entity_does_not_start_editing() {
    let store = store();
    let context = context(Arc::clone(&store), NoteRepository::with_notes([1]));
    let actor = PresenceActor::start(Arc::clone(&context), 99, bot(), false);
    let list = store.list(&TopicId::for_entity(99), AVATAR_LIST);

    avatars::add_presence(list.as_ref(), &person(1)).unwrap();

    assert!(actor.has_real_actors());
    assert!(context.registry.is_empty());
}

#[test]
fn test_roaming_actor_moves_between_topics() {
    let memory = Arc::new(InMemoryTopicStore::new());
    let store: Arc<dyn TopicStore> = memory.clone();
    let identity = IdentityGenerator::new().generate(ROAMING_BOT_PREFIX);
    let roaming = RoamingPresenceActor::new(identity.clone(), Arc::clone(&store));
    let first = TopicId::for_entity(1);
    let second = TopicId::for_entity(2);

    assert!(roaming.retarget(1));
    assert_eq!(roaming.target(), Some(1));
    assert!(!roaming.retarget(1));
    assert_eq!(memory.connection_count(&first), 1);
    assert_eq!(
        avatars::present_actors(store.list(&first, AVATAR_LIST).as_ref()),
        vec![identity.clone()]
    );

    avatars::add_presence(store.list(&first, AVATAR_LIST).as_ref(), &person(1)).unwrap();
    assert!(roaming.has_real_actors());

    assert!(roaming.retarget(2));
    assert_eq!(memory.connection_count(&first), 0);
    assert_eq!(avatars::real_count(store.list(&first, AVATAR_LIST).as_ref()), 1);
    assert_eq!(
        avatars::count_where(store.list(&first, AVATAR_LIST).as_ref(), |a| a.is_synthetic()),
        0
    );
    assert!(!roaming.has_real_actors());
    assert_eq!(memory.connected_actors(&second), vec![identity.id.clone()]);

    roaming.close();
    assert_eq!(roaming.target(), None);
    assert!(store.list(&second, AVATAR_LIST).items().is_empty());
}
