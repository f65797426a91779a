//! Database schema definitions for the attestation storage engine.
//!
//! Column names are semantic, matching §6 of the storage specification.
//! Signing columns (`signature`, `signer_did`) are carried as additive,
//! nullable columns — absence must never break reads or writes (§9 Open
//! Question).

/// The attestation table: one row per attested fact.
pub const CREATE_ATTESTATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS attestations (
    id TEXT PRIMARY KEY NOT NULL,
    subjects TEXT NOT NULL,
    predicates TEXT NOT NULL,
    contexts TEXT NOT NULL,
    actors TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    source TEXT NOT NULL DEFAULT '',
    attributes TEXT,
    created_at INTEGER NOT NULL,
    signature TEXT,
    signer_did TEXT
)
"#;

pub const CREATE_ATTESTATIONS_TIMESTAMP_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_attestations_timestamp
ON attestations(timestamp DESC)
"#;

pub const CREATE_ATTESTATIONS_CREATED_AT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_attestations_created_at
ON attestations(created_at DESC)
"#;

/// Bidirectional alias edges. Unique on `(alias, target)`; case-insensitive
/// lookups are performed by the resolver via `COLLATE NOCASE` comparisons,
/// not by this index, since SQLite indexes are case-sensitive by default.
pub const CREATE_ALIASES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS aliases (
    alias TEXT NOT NULL,
    target TEXT NOT NULL,
    created_by TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    PRIMARY KEY (alias, target)
)
"#;

pub const CREATE_ALIASES_ALIAS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_aliases_alias_nocase
ON aliases(alias COLLATE NOCASE)
"#;

pub const CREATE_ALIASES_TARGET_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_aliases_target_nocase
ON aliases(target COLLATE NOCASE)
"#;

/// Dense-vector embeddings, keyed by an 8-character opaque ID.
pub const CREATE_EMBEDDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    id TEXT PRIMARY KEY NOT NULL,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    text TEXT NOT NULL DEFAULT '',
    embedding BLOB NOT NULL,
    model TEXT NOT NULL DEFAULT '',
    dimensions INTEGER NOT NULL,
    cluster_id INTEGER,
    cluster_probability REAL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

pub const CREATE_EMBEDDINGS_SOURCE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_embeddings_source
ON embeddings(source_type, source_id)
"#;

pub const CREATE_EMBEDDINGS_CLUSTER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_embeddings_cluster
ON embeddings(cluster_id)
"#;

/// Parallel vector index. A real `vec0`/`vec_distance_L2` virtual table is
/// assumed by the specification (§6); this plain table plus a brute-force
/// join (see `storage::embeddings::search_nearest`) is the portable
/// fallback when that extension isn't loaded, mirroring how upstream
/// falls back to cosine similarity computed in Rust when a native vector
/// index migration hasn't been applied.
pub const CREATE_VEC_EMBEDDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS vec_embeddings (
    embedding_id TEXT PRIMARY KEY NOT NULL,
    embedding BLOB NOT NULL
)
"#;

/// A clustering run: one row per invocation of the external clustering
/// algorithm (HDBSCAN, UMAP, PCA — out of scope here; this only persists
/// their outputs).
pub const CREATE_CLUSTER_RUNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cluster_runs (
    id TEXT PRIMARY KEY NOT NULL,
    input_size INTEGER NOT NULL,
    output_cluster_count INTEGER NOT NULL,
    noise_count INTEGER NOT NULL,
    min_cluster_size INTEGER NOT NULL,
    duration_ms INTEGER,
    created_at INTEGER NOT NULL
)
"#;

/// Cluster identity: a stable id across runs, auto-assigned by the
/// underlying engine's integer primary key.
pub const CREATE_CLUSTERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT,
    first_seen_run TEXT NOT NULL,
    last_seen_run TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    labeled_at INTEGER
)
"#;

pub const CREATE_CLUSTERS_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_clusters_status
ON clusters(status)
"#;

/// Per-(cluster, run) centroid blob and member count.
pub const CREATE_CLUSTER_SNAPSHOTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cluster_snapshots (
    cluster_id INTEGER NOT NULL,
    run_id TEXT NOT NULL,
    centroid BLOB NOT NULL,
    member_count INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (cluster_id, run_id)
)
"#;

/// Per-(run, cluster) lifecycle event: birth, death, or stable.
pub const CREATE_CLUSTER_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cluster_events (
    run_id TEXT NOT NULL,
    cluster_id INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    similarity REAL,
    created_at INTEGER NOT NULL
)
"#;

pub const CREATE_CLUSTER_EVENTS_RUN_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_cluster_events_run
ON cluster_events(run_id, cluster_id)
"#;

/// Single row per active cluster: its current best centroid.
pub const CREATE_CLUSTER_CENTROIDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cluster_centroids (
    cluster_id INTEGER PRIMARY KEY NOT NULL,
    centroid BLOB NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

/// Per-(embedding, method) 2-D projection coordinates, for visualisation.
pub const CREATE_EMBEDDING_PROJECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS embedding_projections (
    embedding_id TEXT NOT NULL,
    method TEXT NOT NULL,
    x REAL NOT NULL,
    y REAL NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (embedding_id, method)
)
"#;

/// Persisted reactive triggers. Dispatch itself is external (§6).
pub const CREATE_WATCHERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS watchers (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    filter TEXT NOT NULL,
    action_type TEXT NOT NULL,
    action_payload TEXT NOT NULL DEFAULT '',
    max_fires_per_minute INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    fire_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    last_fired_at INTEGER,
    last_error TEXT,
    created_at INTEGER NOT NULL
)
"#;

pub const CREATE_WATCHERS_ENABLED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_watchers_enabled
ON watchers(enabled)
"#;

/// All schema statements, in dependency order. Safe to run repeatedly
/// (`CREATE TABLE IF NOT EXISTS`).
pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_ATTESTATIONS_TABLE,
    CREATE_ATTESTATIONS_TIMESTAMP_INDEX,
    CREATE_ATTESTATIONS_CREATED_AT_INDEX,
    CREATE_ALIASES_TABLE,
    CREATE_ALIASES_ALIAS_INDEX,
    CREATE_ALIASES_TARGET_INDEX,
    CREATE_EMBEDDINGS_TABLE,
    CREATE_EMBEDDINGS_SOURCE_INDEX,
    CREATE_EMBEDDINGS_CLUSTER_INDEX,
    CREATE_VEC_EMBEDDINGS_TABLE,
    CREATE_CLUSTER_RUNS_TABLE,
    CREATE_CLUSTERS_TABLE,
    CREATE_CLUSTERS_STATUS_INDEX,
    CREATE_CLUSTER_SNAPSHOTS_TABLE,
    CREATE_CLUSTER_EVENTS_TABLE,
    CREATE_CLUSTER_EVENTS_RUN_INDEX,
    CREATE_CLUSTER_CENTROIDS_TABLE,
    CREATE_EMBEDDING_PROJECTIONS_TABLE,
    CREATE_WATCHERS_TABLE,
    CREATE_WATCHERS_ENABLED_INDEX,
];
