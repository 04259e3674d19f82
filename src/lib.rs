//! docview: a document archive viewer with generated, scroll-synced tables
//! of contents, served over HTTP or browsed in the terminal.

pub mod config;
pub mod error;
pub mod html;
pub mod parse;
pub mod render;
pub mod serve;
pub mod source;
pub mod spy;
pub mod toc;
pub mod view;
pub mod web_assets;
