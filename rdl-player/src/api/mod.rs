//! HTTP API: lesson views, playback control, SSE and the embedded page

pub mod handlers;
pub mod server;
pub mod sse;
pub mod ui;

pub use server::{build_router, AppContext};
