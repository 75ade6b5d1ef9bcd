mod candle_service;
mod model;
mod model_service;
mod preprocess;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;

pub use app::start_app;
