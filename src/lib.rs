//! Forum graph scraper library.
//!
//! Crawls a paginated web forum through a rate-limited fetch gateway,
//! extracts thread, post and user records, and derives a directed
//! quote/mention interaction graph from post bodies.

pub mod config;
pub mod crawl;
pub mod dom;
pub mod extract;
pub mod fetch;
pub mod interactions;
pub mod model;
pub mod pagination;
pub mod sink;
pub mod thread;
pub mod users;
