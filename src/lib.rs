pub mod audit;
pub mod backend;
pub mod budget;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod graph;
pub mod lifecycle;
pub mod project;
pub mod resolution;
