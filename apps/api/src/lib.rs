//! Vellum: resume records rendered to LaTeX and compiled to PDF, either in
//! the request or through a Redis-backed queue and an S3-compatible store.

pub mod compile;
pub mod config;
pub mod db;
pub mod errors;
pub mod jobs;
pub mod layout;
pub mod models;
pub mod queue;
pub mod records;
pub mod render;
pub mod routes;
pub mod state;
pub mod storage;
pub mod telemetry;
