//! Database models split into domain-specific modules.

pub mod category;
pub mod session;
pub mod settings;
pub mod transaction;
pub mod user;

pub use category::*;
pub use session::*;
pub use settings::*;
pub use transaction::*;
pub use user::*;
