pub mod catalog;
pub mod config;
pub mod context;
pub mod errors;
pub mod hls;
pub mod models;
pub mod proxy;
pub mod services;
pub mod stalker;
pub mod utils;
pub mod web;
