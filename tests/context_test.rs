//! Context budgeting properties through the wired app state.

mod helpers;

use chrono::Utc;
use stratus::context::ContextGroup;
use stratus::memory::MemoryType;
use stratus::sessions::{Role, SessionMessage};

use helpers::{app_state, tenant_scope};

#[tokio::test]
async fn full_build_renders_labeled_sections_within_budget() {
    let state = app_state();
    let scope = tenant_scope();

    let session = state
        .sessions
        .create(&scope, "model-a", None, None)
        .await
        .unwrap();
    state
        .sessions
        .add_message(
            &scope,
            &session.session_id,
            SessionMessage {
                role: Role::User,
                content: "why is checkout latency up?".into(),
                timestamp: Utc::now(),
                metadata: None,
            },
        )
        .await
        .unwrap();

    state
        .memory
        .store(
            &scope,
            "checkout latency correlates with payment provider retries",
            MemoryType::Longterm,
            None,
            0.9,
            vec![],
        )
        .await
        .unwrap();
    state
        .memory
        .store_decision(
            &scope,
            &session.session_id,
            "mitigation",
            "checkout latency alarm fired",
            "retry budget on the payment client was unbounded",
            "capped retries and added jitter",
            0.8,
            vec![],
            vec![],
        )
        .await
        .unwrap();

    let max_units = 4_000;
    let built = state
        .context
        .build(
            &scope,
            &session.session_id,
            "checkout latency",
            &[
                ContextGroup::Sessions,
                ContextGroup::Memory,
                ContextGroup::Decisions,
            ],
            max_units,
        )
        .await
        .unwrap();

    assert!(built.context.contains("## Session Context"));
    assert!(built.context.contains("## Relevant Memories"));
    assert!(built.context.contains("## Past Decisions"));
    assert!(built.context.contains("[user]: why is checkout latency up?"));
    assert!(built.context.len() <= max_units + 2); // section joiners only
    assert_eq!(built.sources[&ContextGroup::Sessions], 1);
    assert_eq!(built.sources[&ContextGroup::Memory], 1);
    assert_eq!(built.sources[&ContextGroup::Decisions], 1);
}

#[tokio::test]
async fn tight_budget_emits_whole_items_only() {
    let state = app_state();
    let scope = tenant_scope();

    for i in 0..5 {
        state
            .general
            .store(
                &scope,
                &format!("standing directive {i}: freeze deploys during regional failover"),
                "note",
                None,
            )
            .await
            .unwrap();
    }

    let max_units = 150;
    let built = state
        .context
        .build(
            &scope,
            "s-none",
            "deploy freeze failover",
            &[ContextGroup::General],
            max_units,
        )
        .await
        .unwrap();

    let included = built.sources[&ContextGroup::General];
    assert!(included >= 1 && included < 5);
    assert!(built.context.len() <= max_units);
    // No partial items: every emitted line is a complete directive.
    for line in built.context.lines().skip(1) {
        assert!(line.starts_with("- standing directive"));
        assert!(line.ends_with("regional failover"));
    }
}

#[tokio::test]
async fn source_counts_never_exceed_retrieved() {
    let state = app_state();
    let scope = tenant_scope();

    for i in 0..12 {
        state
            .general
            .store(&scope, &format!("observability note {i}"), "note", None)
            .await
            .unwrap();
    }

    let built = state
        .context
        .build(
            &scope,
            "s-none",
            "observability",
            &[ContextGroup::General],
            1_000_000,
        )
        .await
        .unwrap();

    // Retrieval is capped by config (context_retrieve_k = 5 by default).
    assert!(built.sources[&ContextGroup::General] <= 5);
}

#[tokio::test]
async fn empty_group_budget_flows_to_later_groups() {
    let state = app_state();
    let scope = tenant_scope();

    for i in 0..8 {
        state
            .general
            .store(
                &scope,
                &format!("routing policy fragment {i} for the edge proxy fleet"),
                "note",
                None,
            )
            .await
            .unwrap();
    }

    let total = 300;
    let with_empty_first = state
        .context
        .build(
            &scope,
            "s-none",
            "routing policy edge proxy",
            &[ContextGroup::Inventory, ContextGroup::General],
            total,
        )
        .await
        .unwrap();
    let alone_half = state
        .context
        .build(
            &scope,
            "s-none",
            "routing policy edge proxy",
            &[ContextGroup::General],
            total / 2,
        )
        .await
        .unwrap();

    assert_eq!(with_empty_first.sources[&ContextGroup::Inventory], 0);
    assert!(
        with_empty_first.sources[&ContextGroup::General]
            >= alone_half.sources[&ContextGroup::General]
    );
}

#[tokio::test]
async fn missing_session_contributes_nothing() {
    let state = app_state();
    let built = state
        .context
        .build(
            &tenant_scope(),
            "no-such-session",
            "anything",
            &[ContextGroup::Sessions],
            5_000,
        )
        .await
        .unwrap();
    assert_eq!(built.sources[&ContextGroup::Sessions], 0);
    assert!(built.context.is_empty());
}
