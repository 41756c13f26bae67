pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;
pub mod upstream;
mod middleware;


pub use routes::create_router;
pub use server::start_server;
pub use types::AppState;
