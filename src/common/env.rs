use std::env;

pub fn env_str(name: &str) -> Option<String> {
    env::var(name).ok()
}

pub fn env_int(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

pub fn env_bool(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(v) if v == "true" || v == "1" => Some(true),
        Ok(v) if v == "false" || v == "0" => Some(false),
        _ => None,
    }
}
