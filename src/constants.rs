// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_DATA_PATH: &str = "data";
pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:8080";
pub const DATABASE_FILE_NAME: &str = "budget-buddy.db";

// Session configuration
pub const SESSION_NAME: &str = "budget_buddy_session";
pub const SESSION_EXPIRY_DAYS: i64 = 30;
pub const MIN_SESSION_SECRET_LENGTH: usize = 64;

// Scheduled jobs, local to the server clock (UTC)
pub const DEFAULT_DELETION_SWEEP_AT: &str = "00:30";
pub const DEFAULT_RECURRING_PAYMENTS_AT: &str = "01:30";
pub const DEFAULT_ACCOUNT_DELETION_GRACE_DAYS: i64 = 30;
pub const MAX_ACCOUNT_DELETION_GRACE_DAYS: i64 = 3650;

// Tables
pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const SUBSCRIPTIONS_TABLE: &str = "subscriptions";
pub const USERS_TABLE: &str = "users";
pub const CATEGORIES_TABLE: &str = "categories";

// Validation limits
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_USERNAME_LENGTH: usize = 4;
pub const MIN_PASSWORD_LENGTH: usize = 6;

// Error messages
pub const ERR_DATABASE_OPERATION: &str = "Database operation failed";
pub const ERR_INVALID_SESSION: &str = "Invalid session";
pub const ERR_UNAUTHORIZED: &str = "Not logged in";
