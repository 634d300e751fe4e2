//! Built-in feeders.

mod file;
mod list;

pub use file::FileFeeder;
pub use list::ListFeeder;

use archivist_shared::FeedItem;

/// Parse one `url[<TAB>folder]` line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<FeedItem> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.splitn(2, '\t');
    let url = parts.next()?.trim();
    if url.is_empty() {
        return None;
    }
    let item = FeedItem::new(url);
    match parts.next().map(str::trim).filter(|f| !f.is_empty()) {
        Some(folder) => Some(item.with_folder(folder)),
        None => Some(item),
    }
}
