//! Root logger construction, shared by every gateway process.

use slog::{Drain, Logger};

/// Builds the root logger: an async drain over a term-decorated full
/// formatter. Every component derives a child logger from this one via
/// `logger.new(o!(...))` so that role/node identity is carried on every
/// log line without the component having to format it itself.
pub fn get_root_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}
