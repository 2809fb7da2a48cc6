//! Runway relay: asynchronous video-generation job tracker.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod remote;
pub mod storage;
