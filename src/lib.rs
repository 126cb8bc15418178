//! Impersonator finder library
//!
//! For each target account, collects look-alike profiles from a profile
//! directory API, scores them on avatar, display name and bio similarity, and
//! reports the most likely impersonator.

pub mod acquire;
pub mod api;
pub mod avatar;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logger;
pub mod pipeline;
pub mod pool;
pub mod profile;
pub mod scoring;
pub mod selector;
pub mod similarity;
pub mod store;
