// Not every test binary exercises every harness helper
#![allow(dead_code)]

pub mod config;
pub mod mock_upstream;
pub mod server;
