// Paged listing traversal

use crate::api::PokemonApi;
use crate::error::Result;
use crate::models::{EndpointKind, Page, Record};
use crate::throttle::Pacer;

/// Hard ceiling on pages fetched in one traversal
const MAX_PAGES: u64 = 100_000;

/// Anything that can serve one page of a listing
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_page(&self, kind: EndpointKind, page: u64, per_page: u64) -> Result<Page>;
}

impl PageSource for PokemonApi {
    async fn fetch_page(&self, kind: EndpointKind, page: u64, per_page: u64) -> Result<Page> {
        self.list_page(kind, page, per_page).await
    }
}

/// Whether `page` is the final page of a traversal
///
/// Stops when the pages seen so far cover the reported total, or when the page
/// came back short. A missing total counts as the number of items on this page,
/// and a zero total ends the traversal.
pub fn is_last_page(page: u64, per_page: u64, total: Option<u64>, received: usize) -> bool {
    let per_page = per_page.max(1);
    let total = total.unwrap_or(received as u64);
    (received as u64) < per_page || page.saturating_mul(per_page) >= total
}

/// Drives a listing endpoint page by page
pub struct Paginator<'a, S> {
    source: &'a S,
    pacer: &'a Pacer,
}

impl<'a, S: PageSource> Paginator<'a, S> {
    pub fn new(source: &'a S, pacer: &'a Pacer) -> Self {
        Self { source, pacer }
    }

    /// Fetch every page of `kind` and return the items in server order
    pub async fn fetch_all(&self, kind: EndpointKind, per_page: u64) -> Result<Vec<Record>> {
        let per_page = per_page.max(1);
        let mut accumulated: Vec<Record> = Vec::new();
        let mut total_pages: Option<u64> = None;
        let mut page = 1;

        loop {
            self.pacer.acquire().await;
            let response = self.source.fetch_page(kind, page, per_page).await?;
            let received = response.items.len();
            accumulated.extend(response.items);

            if let Some(total) = response.total.filter(|t| *t > 0) {
                total_pages.get_or_insert_with(|| total.div_ceil(per_page));
            }

            match (total_pages, response.total) {
                (Some(pages), Some(total)) => tracing::info!(
                    "{}: page {}/{} (accumulated: {}/{})",
                    kind.label(),
                    page,
                    pages,
                    accumulated.len(),
                    total
                ),
                _ => tracing::info!(
                    "{}: page {} (accumulated: {})",
                    kind.label(),
                    page,
                    accumulated.len()
                ),
            }

            if is_last_page(page, per_page, response.total, received) {
                break;
            }

            if page >= MAX_PAGES {
                tracing::warn!(
                    kind = kind.label(),
                    pages = page,
                    "Stopping pagination at page ceiling"
                );
                break;
            }
            page += 1;
        }

        Ok(accumulated)
    }
}
