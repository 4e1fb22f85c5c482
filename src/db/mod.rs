//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Provider OAuth tokens (keyed by user id)
    pub const TOKENS: &str = "tokens";
    pub const DIARY_ENTRIES: &str = "diary_entries";
    pub const MAP_GROUPS: &str = "map_groups";
    pub const MAP_ENTRIES: &str = "map_entries";
    pub const TRACKS: &str = "tracks";
}
