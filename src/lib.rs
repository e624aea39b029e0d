pub mod app;
pub mod config;
pub mod domain;
pub mod encoding;
pub mod error;
pub mod fetch;
pub mod format;
pub mod fs_util;
pub mod normalize;
pub mod output;
pub mod parse;
pub mod publish;
pub mod schedule;
pub mod sheet;
pub mod store;
pub mod upsert;
pub mod vector;
