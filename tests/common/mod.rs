#![allow(dead_code)]

pub mod memory_store;
pub mod mock_mutex;
