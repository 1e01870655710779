mod read;
mod types;
mod write;

use super::PostgresRepositories;

const POST_COLUMNS: &str =
    "id, author_id, community_id, title, content, view_count, created_at, updated_at";
