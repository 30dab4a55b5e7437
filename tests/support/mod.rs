#![allow(dead_code)]

pub mod mock_service;
pub mod snapclass_env;
