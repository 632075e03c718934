#[cfg(unix)]
pub use unix::*;

#[cfg(unix)]
mod unix;
