//! # Playback Module
//!
//! Single-track playback per guild. The [`PlaybackController`] owns every
//! guild's [`PlaybackState`](crate::models::PlaybackState) and is the only
//! code that starts, pauses, resumes or stops transport sources.

pub mod controller;

pub use controller::{Completion, PlaybackController};
