//! Application services: post reads and writes, voting, communities, comments
//! and background jobs.

pub mod comments;
pub mod communities;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod posts;
pub mod repos;
