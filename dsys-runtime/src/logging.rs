//! Logging setup, shared by every `dsys-*` binary.

/// Initializes `pretty_env_logger` from `RUST_LOG`, defaulting to `info` when unset.
pub fn init() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::formatted_timed_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_default())
        .format_timestamp_millis()
        .try_init();
}

/// Initializes logging with an explicit filter directive, overriding `RUST_LOG`.
/// Used by binaries' `-d` flag to force debug-level output regardless of environment.
pub fn init_with_directives(directives: &str) {
    let _ = pretty_env_logger::formatted_timed_builder()
        .parse_filters(directives)
        .format_timestamp_millis()
        .try_init();
}
