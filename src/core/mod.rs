pub mod aggregator;
pub mod config;
pub mod database;
pub mod geometry;
pub mod service;

// Violation detection
pub mod detectors;

// Evidence storage and reporting
pub mod evidence_store;
pub mod report;
