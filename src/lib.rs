pub mod app;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod provider;
pub mod state;
pub mod web;
