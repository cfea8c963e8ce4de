// Pokemon ETL - Library root

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod http_client;
pub mod models;
pub mod paginator;
pub mod pipeline;
pub mod reconciler;
pub mod throttle;
