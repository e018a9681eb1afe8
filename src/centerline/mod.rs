pub mod adjacency;
pub mod builder;

pub use builder::build_branches;
