pub mod aggregate;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod geocode;
pub mod granule;
pub mod net;
pub mod output;
pub mod region;
pub mod server;
pub mod service;
pub mod session;
pub mod transfer;
