// src/ingest/providers/mod.rs
pub mod rss_feed;
pub mod telegram_file;
