//! Tapestry: Budget-Aware Content Generation
//!
//! Turns a user's preference metadata into text, image and audio content across three
//! independent categories. Work fans out to a bounded number of concurrent stages, each
//! choosing between primary and fallback providers according to per-provider usage
//! budgets, and fans back in to one persisted batch per category key.

pub mod budget;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod orchestrator;
pub mod profile;
pub mod provider;
pub mod store;
pub mod types;
