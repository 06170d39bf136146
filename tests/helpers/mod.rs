#![allow(dead_code)]

use std::sync::Arc;

use stratus::config::StratusConfig;
use stratus::index::memory::InMemoryIndex;
use stratus::provider::FixtureSource;
use stratus::scope::ScopeKey;
use stratus::server::AppState;
use stratus::sessions::InMemorySessionStore;

/// App state over the bundled in-process backends.
pub fn app_state() -> AppState {
    AppState::in_process(StratusConfig::default())
}

/// App state with a canned inventory source.
pub fn app_state_with_source(source: FixtureSource) -> AppState {
    AppState::new(
        StratusConfig::default(),
        Arc::new(InMemoryIndex::new()),
        Arc::new(source),
        Arc::new(InMemorySessionStore::new()),
    )
}

pub fn tenant_scope() -> ScopeKey {
    ScopeKey::tenant("acme")
}

pub fn account_scope() -> ScopeKey {
    ScopeKey::account("acme", "123456789012")
}

/// A version-4 declared snapshot: one compute instance at t3.small.
pub const STATE_SNAPSHOT: &str = r#"{
    "version": 4,
    "resources": [
        {
            "type": "compute-instance",
            "name": "api",
            "mode": "managed",
            "instances": [
                {"attributes": {"id": "i-1", "instance_type": "t3.small", "region": "us-east-1"}}
            ]
        }
    ]
}"#;
