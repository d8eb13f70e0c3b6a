pub mod api;
pub mod config;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod router;
pub mod server;
pub mod store;
