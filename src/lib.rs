//! Workspace umbrella crate.
//!
//! Host applications can depend on `player-core-workspace` and enable the
//! documented features instead of wiring each `core-*` crate individually.
//! The default `service` feature exposes the [`CoreService`] façade and the
//! queue model; `lyrics` additionally exposes the metadata crate.

#[cfg(feature = "service")]
pub use core_playback as playback;
#[cfg(feature = "service")]
pub use core_service as service;
#[cfg(feature = "service")]
pub use core_service::CoreService;

#[cfg(feature = "lyrics")]
pub use core_metadata as metadata;
