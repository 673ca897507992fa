pub mod config;
pub mod model;
pub mod remote;
pub mod storage;
pub mod stores;
pub mod sync;
