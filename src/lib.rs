//! storyreel library crate.
//!
//! Turns a short prose script into a narrated multi-scene video using the
//! Gemini text, Veo video and speech APIs, with local persistence, playback
//! and export.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod export;
pub mod gemini;
pub mod pipeline;
pub mod playback;
pub mod progress;
pub mod store;
pub mod story;
pub mod wav;
