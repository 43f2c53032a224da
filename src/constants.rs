/// Local key for the goal configuration
pub const LOCAL_KEY_GOALS: &str = "bossbitch-goals";

/// Local key for display preferences
pub const LOCAL_KEY_PREFERENCES: &str = "bossbitch-preferences";

/// Local key for the income source catalog
pub const LOCAL_KEY_INCOME_SOURCES: &str = "bossbitch-income-sources";

/// Local key prefix for daily entries, completed by an ISO date
pub const LOCAL_DAILY_PREFIX: &str = "bossbitch-daily-";

/// Local key prefix for monthly entries, completed by a `YYYY-MM` key
pub const LOCAL_MONTHLY_PREFIX: &str = "bossbitch-monthly-";

/// Prefix shared by every user-data key in the local store.
/// The offline queue deliberately lives outside it (underscore, not
/// dash) so clearing user data never drops pending actions.
pub const LOCAL_DATA_PREFIX: &str = "bossbitch-";

/// Local key holding the serialized offline action queue
pub const OFFLINE_QUEUE_KEY: &str = "bossbitch_offline_queue";

/// Version stamped into export envelopes
pub const EXPORT_VERSION: u32 = 1;

/// How many trailing months an income-source rename/recolor fans out to
pub const SOURCE_FANOUT_MONTHS: u32 = 12;
