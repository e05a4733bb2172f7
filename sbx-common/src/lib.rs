// sbx-common/src/lib.rs
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod state;
pub mod template;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{Result, SbxError};
pub use state::{StateMarker, StateTracker};
