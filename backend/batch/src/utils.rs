use rand::{Rng, distributions::Alphanumeric, seq::SliceRandom};
use regex::Regex;

pub const DEFAULT_PREFIX: &str = "board";
pub const MAX_PREFIX_LEN: usize = 12;
pub const SUFFIX_LEN: usize = 6;
pub const PASSWORD_LEN: usize = 10;

// no 0/o/1/l/i, these get misread off a printed card
const PASSWORD_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKMNPQRSTUVWXYZ23456789";

pub fn sanitize_prefix(input: &str) -> String {
    let clean = Regex::new(r"[^a-z0-9]").unwrap();
    let mut prefix = clean.replace_all(&input.to_lowercase(), "").into_owned();
    prefix.truncate(MAX_PREFIX_LEN);

    if prefix.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        prefix
    }
}

pub fn random_username(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();

    format!("{prefix}{suffix}")
}

pub fn random_password() -> String {
    let mut rng = rand::thread_rng();

    (0..PASSWORD_LEN)
        .filter_map(|_| PASSWORD_ALPHABET.choose(&mut rng).map(|&b| b as char))
        .collect()
}

pub fn profile_url(site_url: &str, username: &str) -> String {
    format!("{}/{}", site_url.trim_end_matches('/'), username)
}

pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
