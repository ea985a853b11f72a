pub mod env;
pub mod event;
pub mod metadata;
pub mod registry;
pub mod exception;
pub mod record;
pub mod render;
pub mod sink;
pub mod appender;
pub mod layer;

pub mod init;
