//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod activity_repo;
pub mod endpoint_repo;
pub mod repository_repo;

pub use activity_repo::ActivityRepo;
pub use endpoint_repo::EndpointRepo;
pub use repository_repo::RepositoryRepo;
