// Hard-Chat web server library

pub mod config;
pub mod logger;
pub mod web;
