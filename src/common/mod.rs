use rand::distributions::Alphanumeric;
use rand::Rng;

pub mod env;
pub mod json_merge;
pub mod time;

pub fn get_random_str() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
