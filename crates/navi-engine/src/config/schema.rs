use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NaviConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_events_url")]
    pub url: String,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            url: default_events_url(),
            buffer_capacity: default_buffer_capacity(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

fn default_events_url() -> String {
    "ws://localhost:3000/events".to_string()
}

fn default_buffer_capacity() -> usize {
    256
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_max_steps")]
    pub default_max_steps: u32,
    /// Local deadline; unset means a navigation may run indefinitely.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    #[serde(default = "default_early_event_buffer")]
    pub early_event_buffer: bool,
    #[serde(default = "default_early_event_capacity")]
    pub early_event_capacity: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_max_steps: default_max_steps(),
            deadline_ms: None,
            early_event_buffer: default_early_event_buffer(),
            early_event_capacity: default_early_event_capacity(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_steps() -> u32 {
    20
}

fn default_early_event_buffer() -> bool {
    true
}

fn default_early_event_capacity() -> usize {
    64
}
