pub mod config;
pub mod crawler;
pub mod jobs;
pub mod models;
pub mod postprocess;
pub mod storage;
