//! Mediawarden keeps a media library's inventory in step with its files,
//! attributes files to the torrents seeding them, and manages a per-library
//! trash with timed purges.

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod jobs;
pub mod services;
