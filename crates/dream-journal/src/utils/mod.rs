//! Utilities module - text processing shared by search and statistics

pub mod text_utils;

pub use text_utils::TextUtils;
