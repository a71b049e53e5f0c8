#![allow(dead_code)]

pub mod config;
pub mod mock_vendor;
pub mod server;
