//! Pyramid: an authenticated heap-sort service.
//!
//! Each account owns one in-memory integer array, managed and sorted
//! over an HTTP API. The crate splits into three core pieces — session
//! tokens ([`auth`]), the per-identity array store ([`store`]), and the
//! instrumented range sorter ([`sort`]) — plus the gateway and console
//! client built on top of them.

pub mod auth;
pub mod client;
pub mod config;
pub mod gateway;
pub mod sort;
pub mod store;
