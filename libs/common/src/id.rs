use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// ULIDs are lexicographically ordered by creation time, so IDs generated
/// by one process sort in creation order.
///
/// # Examples
/// ```
/// let id = campfire_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const CONNECTION: &str = "conn";
    pub const ROOM: &str = "room";
}
