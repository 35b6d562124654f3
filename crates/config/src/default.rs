use crate::config::Log;

// default values
pub fn get_default_port() -> u32 {
    8000
}

pub fn get_default_address() -> String {
    String::from("0.0.0.0")
}

pub fn get_default_alive() -> bool {
    true
}

pub fn get_default_forward_timeout_ms() -> u64 {
    30_000
}

pub fn get_default_log_level() -> String {
    String::from("info")
}

pub fn get_default_log() -> Log {
    Log {
        level: get_default_log_level(),
    }
}
