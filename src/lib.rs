pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod state;
pub mod visitor;
pub mod voting;
pub mod web;
