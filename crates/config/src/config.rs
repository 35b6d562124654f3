use serde::{Deserialize, Serialize};

use crate::default::{
    get_default_address, get_default_alive, get_default_forward_timeout_ms, get_default_log,
    get_default_log_level, get_default_port,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub listen: Listen,

    // order is the round-robin order
    #[serde(default)]
    pub backends: Vec<Server>,

    #[serde(default = "get_default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,

    #[serde(default = "get_default_log")]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: Listen::default(),
            backends: Vec::new(),
            forward_timeout_ms: get_default_forward_timeout_ms(),
            log: get_default_log(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Listen {
    #[serde(default = "get_default_port")]
    pub port: u32, // 8000

    #[serde(default = "get_default_address")]
    pub address: String, // "0.0.0.0"
}

impl Default for Listen {
    fn default() -> Self {
        Self {
            port: get_default_port(),
            address: get_default_address(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Server {
    Simple(String),
    Full {
        address: String,

        #[serde(default = "get_default_alive")]
        alive: bool,
    },
}

impl Server {
    pub fn address(&self) -> &str {
        match self {
            Server::Simple(address) => address,
            Server::Full { address, .. } => address,
        }
    }

    pub fn alive(&self) -> bool {
        match self {
            Server::Simple(_) => true,
            Server::Full { alive, .. } => *alive,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Log {
    #[serde(default = "get_default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error", "off"
}

impl Default for Log {
    fn default() -> Self {
        get_default_log()
    }
}
