// q_learning.rs
pub mod config;
pub mod dqnet;
