pub mod extract;
pub mod knowledge;
pub use extract::*;
pub use knowledge::*;
