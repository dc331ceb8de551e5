pub mod app;
pub mod http;
pub mod rpc;

pub use app::{build_router, AppState};
