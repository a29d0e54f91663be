pub mod submission;
pub mod types;
