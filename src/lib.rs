pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod form;
pub mod output;
pub mod session;
pub mod utils;

#[cfg(test)]
mod tests;
