pub mod server;

pub use server::{router, router_with_cors, ApiServer, AppState};
