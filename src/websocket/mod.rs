pub mod handler;
pub mod msg_run_handler;

pub use handler::websocket_handler;
