//! Clipboard state for item browsers.
//!
//! Holds an ordered set of item ids staged for a copy or a cut. Consumers
//! that filter or render a tree only ever read from it (`is_cut_mode`,
//! `is_on_clipboard`); the surrounding application mutates it. Every
//! mutation bumps a generation counter so readers can cheaply detect that
//! cached decisions derived from clipboard contents have gone stale.

pub mod clipboard;
pub mod config;
pub mod error;

pub use clipboard::{ClipMode, Clipboard};
pub use config::ClipboardConfig;
pub use error::{ClipError, ClipResult};
