use tracing::debug;

use crate::api::MgnifyClient;
use crate::domain::{Collection, Page};
use crate::error::MirrorError;

pub fn fetch_page<C: MgnifyClient + ?Sized>(
    client: &C,
    url: &str,
    query: &[(&str, String)],
) -> Result<Page, MirrorError> {
    let value = client.get_json(url, query)?;
    Page::from_value(url, value)
}

/// Materializes a whole paginated relation by following `next` until it is null.
///
/// Only the first request carries `page_size`; the server echoes it into the
/// `next` links it hands back.
pub fn fetch_collection<C: MgnifyClient + ?Sized>(
    client: &C,
    url: &str,
    page_size: u32,
) -> Result<Collection, MirrorError> {
    let mut collection = Collection::default();
    let mut current = Some(url.to_string());
    let mut first = true;
    while let Some(url) = current.take() {
        let query = if first {
            vec![("page_size", page_size.to_string())]
        } else {
            Vec::new()
        };
        first = false;
        let page = fetch_page(client, &url, &query)?;
        debug!(url, items = page.data.len(), "collection page");
        collection.data.extend(page.data);
        current = page.next;
    }
    Ok(collection)
}
