pub mod auth;
pub mod batch;
pub mod config;
pub mod desired;
pub mod logging;
pub mod orchestrator;
pub mod ownership;
pub mod pager;
pub mod permissions;
pub mod remote;
pub mod scope;
pub mod storage;
pub mod token_provider;

#[cfg(test)]
mod testing;
