//! Database layer (Supabase REST).

pub mod supabase;

pub use supabase::SupabaseDb;

/// Table names as constants.
pub mod collections {
    /// Default name of the canonical user table.
    pub const USERS: &str = "users";
}
