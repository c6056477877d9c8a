#[macro_use]
extern crate log;

pub mod cli;
pub mod config;
pub mod control;
pub mod controller;
pub mod env;
pub mod error;
pub mod logger;
pub mod procs;
pub mod registry;
pub mod service;
pub mod state_file;
pub mod supervisor;

pub use miette::Result;
