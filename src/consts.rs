//! Default values for the application configuration.

pub const HTTP_PORT: u16 = 8080; // Default HTTP port.
pub const DB_PATH: &str = "./data/clinic.db"; // Default SQLite database path.

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_FULL_NAME: &str = "Administrator";
pub const ADMIN_PASSWORD: &str = "adminpass"; // Initial credential of the seeded admin.

pub const ADMIN_ROLE: &str = "admin";
pub const RECEPTION_ROLE: &str = "recepcion";

pub const ENV_DB_PATH: &str = "FRONTDESK_DB_PATH";
pub const ENV_PORT: &str = "FRONTDESK_PORT";
pub const ENV_ADMIN_PASSWORD: &str = "FRONTDESK_ADMIN_PASSWORD";
