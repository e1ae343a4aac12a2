pub mod code;
pub mod config;
pub mod conversation;
pub mod coverage;
pub mod dimensions;
pub mod elimination;
pub mod error;
pub mod hierarchy;
pub mod keywords;
pub mod model;
pub mod questions;
pub mod rules;
pub mod taxonomy;
