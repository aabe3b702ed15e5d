pub mod config;
pub mod listener;
pub mod runner;
pub mod viewer;
