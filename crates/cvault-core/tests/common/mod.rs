//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod course;
pub mod fake_renderer;
pub mod static_server;
