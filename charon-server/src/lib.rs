//! Library half of the Charon Manager daemon: router, handlers, and
//! shared state, factored out of `main.rs` so integration tests can drive
//! the real router with `tower::ServiceExt::oneshot`.

pub mod api;
pub mod middleware;
pub mod router;
pub mod shutdown;
pub mod state;
