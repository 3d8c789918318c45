//! Common test utilities

#![allow(dead_code)]

pub mod abode_mock;

pub use abode_mock::*;
