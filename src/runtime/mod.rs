//! # Runtime Module
//!
//! Runtime components for the gossip key rotator: initialization, the key
//! file watcher, the event loop and signal handling.

pub mod event_loop;
pub mod initialization;
pub mod shutdown;
pub mod watcher;

pub use event_loop::{EventLoop, Trigger};
pub use initialization::{initialize, resume_baseline, Runtime};
pub use shutdown::cancel_on_signal;
pub use watcher::{FileWatcher, PathWatch, WatchEvent};
