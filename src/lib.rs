// src/lib.rs

//! aqhub: air-quality aggregation for Airly, AQICN and GIOŚ.
//!
//! Control flow: [`aggregator::Aggregator`] → [`batch::BatchOrchestrator`] →
//! provider clients (through [`cache::TtlCache`]) → [`normalize::normalize`].

pub mod aggregator;
pub mod batch;
pub mod cache;
pub mod error;
pub mod models;
pub mod normalize;
pub mod providers;
