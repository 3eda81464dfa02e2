//! Random names and coloured console output

use colored::Colorize;
use rand::Rng;
use tracing::warn;

/// Characters used by [`random_name`]
pub const UPPERCASE_AND_DIGITS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const DIGITS: &str = "0123456789";

/// Default total length of generated names
pub const DEFAULT_NAME_SIZE: usize = 20;

/// Build `prefix + random + suffix` with a total length of `size`.
///
/// When `prefix` and `suffix` already fill `size`, no random part is added
/// and a warning is logged.
pub fn random_string(prefix: &str, suffix: &str, size: usize, charset: &str) -> String {
    let chars: Vec<char> = charset.chars().collect();
    let fixed = prefix.chars().count() + suffix.chars().count();
    let left = size.saturating_sub(fixed);

    if left == 0 || chars.is_empty() {
        warn!(size, prefix, suffix, "Prefix and suffix leave no room for random characters");
        return format!("{}{}", prefix, suffix);
    }

    let mut rng = rand::thread_rng();
    let random: String = (0..left).map(|_| chars[rng.gen_range(0..chars.len())]).collect();
    format!("{}{}{}", prefix, random, suffix)
}

/// Random name such as `poolX8K2...` of [`DEFAULT_NAME_SIZE`] characters
pub fn random_name(prefix: &str) -> String {
    random_string(prefix, "", DEFAULT_NAME_SIZE, UPPERCASE_AND_DIGITS)
}

/// Random digit string of [`DEFAULT_NAME_SIZE`] characters
pub fn random_digits() -> String {
    random_string("", "", DEFAULT_NAME_SIZE, DIGITS)
}

pub fn print_header(message: &str) {
    println!("{}", message.magenta());
}

pub fn print_step(message: &str) {
    println!("{}", format!("\n======= {} =======", message).magenta());
}

pub fn print_ok(message: &str) {
    println!("{}", message.green());
}

pub fn print_warning(message: &str) {
    eprintln!("{}", message.yellow());
}

pub fn print_error(message: &str) {
    eprintln!("{}", message.red());
}
