//! Data models for the car portal

pub mod car;
pub mod stats;
pub mod user;

// Re-export commonly used types
pub use car::{Car, CarForm, CarQuery, InOutStatus, RecordScope};
pub use stats::{StatsQuery, StatsResult};
pub use user::{Role, User, UserClaims};
