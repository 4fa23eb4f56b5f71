pub mod client;

pub use client::HttpGoalAgent;
