pub mod core;
pub mod export;
pub mod models;
pub use self::core::*;
pub use models::*;
