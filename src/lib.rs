pub mod ads;
pub mod ai;
pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod extract;
pub mod facebook;
pub mod logging;
pub mod memory;
pub mod meta;
pub mod models;
pub mod openai;
pub mod routes;
pub mod store;
pub mod users;
