//! Page-number pagination for list responses.
//!
//! `?page=N` selects a 1-based page (or `last`), `?page_size=N` the window
//! size. Responses carry absolute `next`/`previous` links built from the
//! request URL with only the `page` parameter rewritten.

use crate::error::{Error, Result};
use actix_web::HttpRequest;
use serde::Serialize;

const INVALID_PAGE: &str = "Invalid page.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageNumber {
    Number(u64),
    Last,
    /// Unparseable or zero; always out of range.
    Invalid,
}

/// Pagination parameters of one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: PageNumber,
    pub page_size: u64,
}

impl PageRequest {
    /// Interpret raw query values.
    ///
    /// A missing, zero or unparseable `page_size` falls back to `default`;
    /// larger values are capped at `max`.
    pub fn from_params(page: Option<&str>, page_size: Option<&str>, default: u64, max: u64) -> Self {
        let page = match page.map(str::trim) {
            None | Some("") => PageNumber::Number(1),
            Some("last") => PageNumber::Last,
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n > 0 => PageNumber::Number(n),
                _ => PageNumber::Invalid,
            },
        };
        let page_size = page_size
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|size| *size > 0)
            .map_or(default, |size| size.min(max));

        PageRequest { page, page_size }
    }

    /// Resolve against a total record count.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound("Invalid page.")` when the page is outside
    /// `1..=num_pages`.
    pub fn window(&self, count: u64) -> Result<PageWindow> {
        let size = self.page_size.max(1);
        // An empty listing still has one (empty) page.
        let num_pages = count.div_ceil(size).max(1);
        let number = match self.page {
            PageNumber::Number(n) if n <= num_pages => n,
            PageNumber::Last => num_pages,
            _ => return Err(Error::NotFound(INVALID_PAGE.to_string())),
        };
        Ok(PageWindow {
            number,
            num_pages,
            size,
        })
    }
}

/// A resolved, in-range page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub size: u64,
}

impl PageWindow {
    pub fn offset(&self) -> u64 {
        (self.number - 1) * self.size
    }

    pub fn limit(&self) -> u64 {
        self.size
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    /// Slice an in-memory list down to this window.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit()).unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(limit).collect()
    }
}

/// Paginated response body.
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// An empty first page.
    pub fn empty() -> Self {
        Page {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }
}

/// Builds `next`/`previous` URLs for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageLinks {
    base: String,
    /// Raw query pairs other than `page`, in request order.
    query: Vec<String>,
}

impl PageLinks {
    pub fn new(base: impl Into<String>, query_string: &str) -> Self {
        let query = query_string
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| pair.split('=').next() != Some("page"))
            .map(str::to_string)
            .collect();
        PageLinks {
            base: base.into(),
            query,
        }
    }

    pub fn from_request(req: &HttpRequest) -> Self {
        let info = req.connection_info();
        let base = format!("{}://{}{}", info.scheme(), info.host(), req.path());
        PageLinks::new(base, req.query_string())
    }

    fn url_for(&self, page: Option<u64>) -> String {
        let mut pairs = self.query.clone();
        if let Some(page) = page {
            pairs.push(format!("page={}", page));
        }
        if pairs.is_empty() {
            self.base.clone()
        } else {
            format!("{}?{}", self.base, pairs.join("&"))
        }
    }

    pub fn next(&self, window: &PageWindow) -> Option<String> {
        window
            .has_next()
            .then(|| self.url_for(Some(window.number + 1)))
    }

    /// Link to the previous page; page 1 is addressed without `page`.
    pub fn previous(&self, window: &PageWindow) -> Option<String> {
        if !window.has_previous() {
            return None;
        }
        let target = window.number - 1;
        Some(self.url_for((target > 1).then_some(target)))
    }

    pub fn page<T>(&self, window: &PageWindow, count: u64, results: Vec<T>) -> Page<T> {
        Page {
            count,
            next: self.next(window),
            previous: self.previous(window),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_fallbacks() {
        let req = PageRequest::from_params(None, Some("abc"), 10, 100);
        assert_eq!(req.page_size, 10);
        let req = PageRequest::from_params(None, Some("0"), 10, 100);
        assert_eq!(req.page_size, 10);
        let req = PageRequest::from_params(None, Some("500"), 10, 100);
        assert_eq!(req.page_size, 100);
        let req = PageRequest::from_params(None, Some("25"), 10, 100);
        assert_eq!(req.page_size, 25);
    }

    #[test]
    fn test_out_of_range_page_is_not_found() {
        let req = PageRequest::from_params(Some("3"), Some("10"), 10, 100);
        let err = req.window(15).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref msg) if msg == INVALID_PAGE));

        let req = PageRequest::from_params(Some("zero"), None, 10, 100);
        assert!(req.window(15).is_err());
    }

    #[test]
    fn test_empty_listing_has_one_page() {
        let window = PageRequest::from_params(None, None, 10, 100)
            .window(0)
            .unwrap();
        assert_eq!(window.num_pages, 1);
        assert!(!window.has_next());
        assert!(!window.has_previous());
    }

    #[test]
    fn test_last_page() {
        let window = PageRequest::from_params(Some("last"), Some("4"), 10, 100)
            .window(10)
            .unwrap();
        assert_eq!(window.number, 3);
        assert_eq!(window.offset(), 8);
        assert_eq!(window.slice((0..10).collect()), vec![8, 9]);
    }

    #[test]
    fn test_links_rewrite_page_only() {
        let links = PageLinks::new(
            "http://testserver/api/data/",
            "type=building&page=2&page_size=1",
        );
        let window = PageRequest::from_params(Some("2"), Some("1"), 10, 100)
            .window(3)
            .unwrap();
        assert_eq!(
            links.next(&window).as_deref(),
            Some("http://testserver/api/data/?type=building&page_size=1&page=3")
        );
        assert_eq!(
            links.previous(&window).as_deref(),
            Some("http://testserver/api/data/?type=building&page_size=1")
        );
    }

    #[test]
    fn test_links_without_query() {
        let links = PageLinks::new("http://h/api/data/", "page=3");
        let window = PageWindow {
            number: 3,
            num_pages: 3,
            size: 10,
        };
        assert_eq!(links.next(&window), None);
        assert_eq!(
            links.previous(&window).as_deref(),
            Some("http://h/api/data/?page=2")
        );
    }
}
