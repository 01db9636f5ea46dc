mod account;
mod bank;

pub use account::*;
pub use bank::*;

use log::LevelFilter;
use std::env;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Evaluate the code with logging turned off, for expected failures.
#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = ::log::max_level();
        ::log::set_max_level(::log::LevelFilter::Off);
        let result = { $($code)+ };
        ::log::set_max_level(level);
        result
    }};
}
