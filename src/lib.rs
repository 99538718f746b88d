pub mod event;
pub mod parser;
pub mod detectors;
pub mod features;
pub mod jfr_tool;
pub mod source;
pub mod prompt;
pub mod backend;
pub mod report;
pub mod pipeline;
