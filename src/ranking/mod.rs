//! Ranking engine: ordered post indices, votes and view counters, all held in the
//! fast store.

mod config;
mod index;
mod views;
mod votes;

pub use config::RankingConfig;
pub use index::RankingStore;
pub use views::ViewCounter;
pub use votes::{VoteEngine, VoteError, VoteOutcome};
