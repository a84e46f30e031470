use super::RequestsLoggingLevel;
use crate::sync::DEFAULT_CHANNEL_CAPACITY;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub frontend_dir_path: Option<String>,
    /// Messages a sync channel buffers before slow receivers start lagging.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            frontend_dir_path: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
