pub mod config;
pub mod error;
pub mod ingest;
pub mod plugins;
pub mod redline;
pub mod store;

pub mod types;

pub use crate::error::RedlineError;
pub use crate::redline::{Redline, RequestContext};
pub use crate::store::Store;
