// Capture-to-publication pipeline.

pub mod convert;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod messages;
