pub mod archive;
pub mod loader;
pub mod snapshot;
pub mod upsert;
