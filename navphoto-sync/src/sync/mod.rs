mod bulk;
pub mod dedup;
mod delete;
pub mod engine;
pub mod gate;
pub mod matcher;
mod reconcile;
pub mod status;
mod transfer;

#[cfg(test)]
mod test_support;

pub use delete::RemoteCleanup;
