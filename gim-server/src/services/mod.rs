pub mod access;
pub mod concurrency;
pub mod groups;
pub mod hierarchy;
pub mod membership;
mod mutation;
pub mod notify;
pub mod requests;
pub mod resolver;

pub use mutation::{execute, Applied, Mutation, Report};
