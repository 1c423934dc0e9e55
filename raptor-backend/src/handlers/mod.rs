pub mod jobs;
pub mod scram;

pub mod utils;
