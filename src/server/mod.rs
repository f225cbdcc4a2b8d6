mod generate;
mod handlers;
mod models;
mod state;

pub use handlers::{router, run_server, serve};
pub use state::ServerState;
