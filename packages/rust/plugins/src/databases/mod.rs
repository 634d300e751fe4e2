//! Built-in databases.

mod console;

pub use console::ConsoleDb;
