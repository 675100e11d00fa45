/// Maximum number of members in a group chat, enforced client-side before
/// a create request is issued (the server rejects larger groups too).
pub const MAX_GROUP_MEMBERS: usize = 300;

/// Minimum query length before a user search is dispatched.
pub const MIN_SEARCH_QUERY_LEN: usize = 2;

/// Debounce window for search-as-you-type, in milliseconds.
pub const SEARCH_DEBOUNCE_MS: u64 = 500;

/// Capacity of the command channel into the transport session task.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the event channels out of the transport session and engine.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
