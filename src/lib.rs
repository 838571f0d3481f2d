//! Spacekeep: durable storage for replicated vertex trees
//!
//! Each tree in a space is replicated as an append-only log of operations. This crate
//! keeps those logs on disk as per-origin, per-day JSONL shards, buffers writes through
//! a coalescing persistence queue, decodes log lines off the caller's task, and stores
//! attachments in a content-addressable blob store.

pub mod blob;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod logging;
pub mod op;
pub mod persist;
pub mod space;
pub mod tooling;
pub mod types;
