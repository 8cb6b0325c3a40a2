//! Feed reader persistence worker and refresh engine.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod worker;
