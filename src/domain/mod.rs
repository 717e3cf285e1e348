pub mod activity_log;
pub mod models;
pub mod registry;
pub mod settings;
pub mod voice;
