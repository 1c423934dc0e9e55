pub mod adaptive;
pub mod claim;
pub mod create;
pub mod input;
pub mod list;
pub mod output;
pub mod report;
pub mod stats;
pub mod status;
