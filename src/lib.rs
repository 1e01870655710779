//! Plaza: post ranking, vote/view counting and cache consistency for a
//! forum-style community service.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod ranking;
pub mod util;
