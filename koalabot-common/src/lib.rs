// koalabot-common/src/lib.rs
//
// Shared data shapes, repository traits and the workspace error type.

pub mod error;
pub mod models;
pub mod traits;

pub use error::Error;
