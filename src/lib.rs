#[macro_use]
extern crate log;
#[macro_use]
extern crate derive_builder;

pub mod browser_controller;
pub mod config;
pub mod pool;
pub mod types;
pub mod utils;
pub mod worker;
