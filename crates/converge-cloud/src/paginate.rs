//! Offset pagination helper for list endpoints

use std::future::Future;

/// One page of a list call
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total_count: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: usize) -> Self {
        Self { items, total_count }
    }
}

/// Fetch pages starting at offset 0 until `total_count` items were collected.
///
/// An empty page ends the loop early so a shrinking collection cannot spin
/// forever.
pub async fn collect_pages<T, E, F, Fut>(mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    loop {
        let page = fetch(items.len()).await?;
        let total = page.total_count;
        if page.items.is_empty() {
            break;
        }
        items.extend(page.items);
        if items.len() >= total {
            break;
        }
    }
    Ok(items)
}
