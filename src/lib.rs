//! Always on top task timers. Three stopwatches, a pair of keyboard chords that lock the overlay
//! or shrink it to a bar, and a local log of finished sessions with daily stats on top.

pub mod analysis;
pub mod cli;
pub mod fs;
pub mod overlay;
pub mod storage;
pub mod tracker;
pub mod utils;
pub mod window_api;
