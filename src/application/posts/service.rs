use std::sync::Arc;

use crate::application::engine::Engine;
use crate::application::repos::{
    CommunitiesRepo, PostsRepo, PostsWriteRepo, Repositories, UsersRepo,
};
use crate::domain::ids::IdGenerator;
use crate::util::clock::Clock;

/// Post reads, writes and votes over the durable store and the fast store.
#[derive(Clone)]
pub struct PostService {
    pub(crate) reader: Arc<dyn PostsRepo>,
    pub(crate) writer: Arc<dyn PostsWriteRepo>,
    pub(crate) users: Arc<dyn UsersRepo>,
    pub(crate) communities: Arc<dyn CommunitiesRepo>,
    pub(crate) engine: Engine,
    pub(crate) ids: Arc<IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl PostService {
    pub fn new(
        repositories: Repositories,
        engine: Engine,
        ids: Arc<IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reader: repositories.posts,
            writer: repositories.post_writer,
            users: repositories.users,
            communities: repositories.communities,
            engine,
            ids,
            clock,
        }
    }
}
