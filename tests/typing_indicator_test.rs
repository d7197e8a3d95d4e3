//! Typing indicators across two sessions sharing one bus: TTL expiry,
//! renewal, explicit clears, and pruning.

mod common;

use common::*;

#[tokio::test(start_paused = true)]
async fn scenario_d_typing_appears_remotely_and_expires_after_ttl() {
    let env = setup().await;
    let conversation = direct_conversation(&env, env.alice, env.bob).await;

    let session_a = env.state.typing_bus(env.alice).await;
    let session_b = env.state.typing_bus(env.bob).await;

    session_a.composer_input(conversation.id, "hey bo").await;
    settle(50).await;

    assert_eq!(session_b.typists(conversation.id).await, vec![env.alice]);

    // No renewal, no explicit clear: gone within TTL + a tick.
    settle(4_100).await;
    assert!(session_b.typists(conversation.id).await.is_empty());
    assert!(session_a.typists(conversation.id).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn renewal_supersedes_the_earlier_expiry_timer() {
    let env = setup().await;
    let conversation = direct_conversation(&env, env.alice, env.bob).await;

    let session_a = env.state.typing_bus(env.alice).await;
    let session_b = env.state.typing_bus(env.bob).await;

    session_a.composer_input(conversation.id, "h").await;
    settle(2_000).await;
    session_a.composer_input(conversation.id, "he").await;

    // Past the first keystroke's TTL but within the renewal's.
    settle(3_000).await;
    assert_eq!(session_b.typists(conversation.id).await, vec![env.alice]);

    settle(1_200).await;
    assert!(session_b.typists(conversation.id).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn explicit_clear_removes_the_entry_immediately() {
    let env = setup().await;
    let conversation = direct_conversation(&env, env.alice, env.bob).await;

    let session_a = env.state.typing_bus(env.alice).await;
    let session_b = env.state.typing_bus(env.bob).await;

    session_a.composer_input(conversation.id, "never mind").await;
    settle(50).await;
    assert!(!session_b.typists(conversation.id).await.is_empty());

    session_a.clear(conversation.id).await;
    settle(50).await;
    assert!(session_b.typists(conversation.id).await.is_empty());

    // Double clear is a no-op.
    session_a.clear(conversation.id).await;
    settle(50).await;
    assert!(session_b.typists(conversation.id).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn emptying_the_composer_acts_as_a_clear() {
    let env = setup().await;
    let conversation = direct_conversation(&env, env.alice, env.bob).await;

    let session_a = env.state.typing_bus(env.alice).await;
    let session_b = env.state.typing_bus(env.bob).await;

    session_a.composer_input(conversation.id, "wait").await;
    settle(50).await;
    session_a.composer_input(conversation.id, "   ").await;
    settle(50).await;

    assert!(session_b.typists(conversation.id).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn own_events_are_ignored_by_the_publishing_session() {
    let env = setup().await;
    let conversation = direct_conversation(&env, env.alice, env.bob).await;

    let session_a = env.state.typing_bus(env.alice).await;

    session_a.composer_input(conversation.id, "solo").await;
    settle(50).await;

    // The local entry exists once; the bus echo neither duplicated nor
    // disturbed it.
    assert_eq!(session_a.typists(conversation.id).await, vec![env.alice]);
}

#[tokio::test(start_paused = true)]
async fn multiple_typists_are_retained_per_conversation() {
    let env = setup().await;
    let conversation = direct_conversation(&env, env.alice, env.bob).await;

    let session_a = env.state.typing_bus(env.alice).await;
    let session_b = env.state.typing_bus(env.bob).await;
    let session_c = env.state.typing_bus(env.carol).await;

    session_a.composer_input(conversation.id, "one").await;
    session_b.composer_input(conversation.id, "two").await;
    settle(50).await;

    let mut typists = session_c.typists(conversation.id).await;
    typists.sort();
    let mut expected = vec![env.alice, env.bob];
    expected.sort();
    assert_eq!(typists, expected);
}

#[tokio::test(start_paused = true)]
async fn pruning_drops_entries_for_unknown_conversations() {
    let env = setup().await;
    let known = direct_conversation(&env, env.alice, env.bob).await;
    let removed = direct_conversation(&env, env.alice, env.carol).await;

    let session_b = env.state.typing_bus(env.bob).await;
    let session_a = env.state.typing_bus(env.alice).await;

    session_a.composer_input(known.id, "staying").await;
    session_a.composer_input(removed.id, "going").await;
    settle(50).await;

    session_b.prune(&[known.id]).await;
    assert_eq!(session_b.typists(known.id).await, vec![env.alice]);
    assert!(session_b.typists(removed.id).await.is_empty());
}
