//! Memory lifecycle properties: promotion, cleanup, access tracking.

mod helpers;

use stratus::memory::{MemoryFilter, MemoryType};

use helpers::{app_state, tenant_scope};

#[tokio::test]
async fn promotion_moves_memory_between_physical_indexes() {
    let state = app_state();
    let scope = tenant_scope();

    let memory = state
        .memory
        .store(
            &scope,
            "the blue environment owns the canary dns record",
            MemoryType::Session,
            Some("s1".into()),
            0.8,
            vec!["dns".into()],
        )
        .await
        .unwrap();

    state.memory.promote(&scope, &memory.memory_id).await.unwrap();

    // Absent from the session index.
    assert!(state
        .memory
        .get(&scope, &memory.memory_id, Some(MemoryType::Session))
        .await
        .unwrap()
        .is_none());

    // Present in the long-term index with identical content and tags.
    let promoted = state
        .memory
        .get(&scope, &memory.memory_id, Some(MemoryType::Longterm))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(promoted.content, "the blue environment owns the canary dns record");
    assert_eq!(promoted.tags, vec!["dns".to_string()]);
    assert_eq!(promoted.memory_id, memory.memory_id);
}

#[tokio::test]
async fn cleanup_scenario_keeps_above_threshold() {
    let state = app_state();
    let scope = tenant_scope();

    for (content, importance) in [
        ("critical: region failover credentials rotated", 0.9),
        ("scratch: tried restarting the agent twice", 0.3),
    ] {
        state
            .memory
            .store(
                &scope,
                content,
                MemoryType::Session,
                Some("s1".into()),
                importance,
                vec![],
            )
            .await
            .unwrap();
    }

    let deleted = state
        .memory
        .cleanup_session(&scope, "s1", true, 0.7)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let filter = MemoryFilter {
        session_id: Some("s1".into()),
        ..Default::default()
    };
    let hits = state
        .memory
        .search(&scope, "credentials rotated restarting", &filter, 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].memory.content.starts_with("critical"));
}

#[tokio::test]
async fn access_metadata_tracks_gets_and_search_hits() {
    let state = app_state();
    let scope = tenant_scope();

    let memory = state
        .memory
        .store(
            &scope,
            "grafana dashboards live under the platform folder",
            MemoryType::Longterm,
            None,
            0.5,
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(memory.access_count, 0);

    state
        .memory
        .get(&scope, &memory.memory_id, None)
        .await
        .unwrap()
        .unwrap();
    let hits = state
        .memory
        .search(&scope, "grafana dashboards", &MemoryFilter::default(), 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    // One get plus one search hit.
    let fetched = state
        .memory
        .get(&scope, &memory.memory_id, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.access_count, 3);
}

#[tokio::test]
async fn importance_update_is_visible_to_subsequent_searches() {
    let state = app_state();
    let scope = tenant_scope();

    let memory = state
        .memory
        .store(
            &scope,
            "the payments team owns the ledger service",
            MemoryType::Longterm,
            None,
            0.2,
            vec![],
        )
        .await
        .unwrap();

    let strict = MemoryFilter {
        min_importance: 0.8,
        ..Default::default()
    };
    let before = state
        .memory
        .search(&scope, "ledger service owner", &strict, 5)
        .await
        .unwrap();
    assert!(before.is_empty());

    state
        .memory
        .update_importance(&scope, &memory.memory_id, 0.95, None)
        .await
        .unwrap();

    let after = state
        .memory
        .search(&scope, "ledger service owner", &strict, 5)
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn decisions_round_trip_through_search() {
    let state = app_state();
    let scope = tenant_scope();

    let stored = state
        .memory
        .store_decision(
            &scope,
            "s1",
            "schema-change",
            "orders table is hitting max row size",
            "splitting the json payload column avoids a rewrite of hot rows",
            "migration scheduled for the low-traffic window",
            0.75,
            vec!["database".into()],
            vec!["migration".into()],
        )
        .await
        .unwrap();

    let hits = state
        .memory
        .search_decisions(
            &scope,
            "orders table row size",
            &Default::default(),
            5,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    let decision = &hits[0].decision;
    assert_eq!(decision.decision_id, stored.decision_id);
    assert_eq!(decision.context_text, "orders table is hitting max row size");
    assert_eq!(
        decision.outcome_text,
        "migration scheduled for the low-traffic window"
    );
    assert_eq!(decision.related_resource_types, vec!["database".to_string()]);
}
