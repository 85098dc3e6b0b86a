// src/pagination.rs
use crate::error::ApiError;
use actix_web::HttpRequest;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub page_size: u32,
    pub max_page_size: u32,
}

pub const COURSE_PAGINATOR: Paginator = Paginator {
    page_size: 5,
    max_page_size: 50,
};

pub const LESSON_PAGINATOR: Paginator = Paginator {
    page_size: 10,
    max_page_size: 100,
};

pub const DEFAULT_PAGINATOR: Paginator = Paginator {
    page_size: 10,
    max_page_size: 100,
};

// Raw strings: a malformed page_size falls back to the default instead of failing the request.
#[derive(Deserialize, Debug, Default)]
pub struct PageParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

/// Slice of a result set handed to the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

fn invalid_page() -> ApiError {
    ApiError::NotFound("Invalid page.".to_string())
}

impl Paginator {
    pub fn window(&self, params: &PageParams) -> Result<PageWindow, ApiError> {
        let page_size = params
            .page_size
            .as_deref()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|size| *size > 0)
            .map(|size| size.min(self.max_page_size))
            .unwrap_or(self.page_size);

        let page = match params.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(invalid_page)?,
        };

        Ok(PageWindow { page, page_size })
    }

    pub fn page<T>(
        &self,
        window: PageWindow,
        total: i64,
        results: Vec<T>,
        req: &HttpRequest,
    ) -> Result<Page<T>, ApiError> {
        let pages = page_count(total, window.page_size);
        if window.page > pages {
            return Err(invalid_page());
        }

        let link = |page: u32| page_link(req.path(), req.query_string(), page, window.page_size);
        Ok(Page {
            count: total,
            next: (window.page < pages).then(|| link(window.page + 1)),
            previous: (window.page > 1).then(|| link(window.page - 1)),
            results,
        })
    }
}

// An empty result set still has one (empty) page.
fn page_count(total: i64, page_size: u32) -> u32 {
    let pages = (total.max(0) as u64).div_ceil(page_size as u64).max(1);
    pages.min(u32::MAX as u64) as u32
}

fn page_link(path: &str, query: &str, page: u32, page_size: u32) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key != "page" && key != "page_size" {
            serializer.append_pair(&key, &value);
        }
    }
    serializer.append_pair("page", &page.to_string());
    serializer.append_pair("page_size", &page_size.to_string());
    format!("{}?{}", path, serializer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn params(page: Option<&str>, page_size: Option<&str>) -> PageParams {
        PageParams {
            page: page.map(str::to_string),
            page_size: page_size.map(str::to_string),
        }
    }

    #[test]
    fn page_size_is_clamped_and_defaulted() {
        let w = COURSE_PAGINATOR.window(&params(None, None)).unwrap();
        assert_eq!(w, PageWindow { page: 1, page_size: 5 });

        let w = COURSE_PAGINATOR.window(&params(None, Some("500"))).unwrap();
        assert_eq!(w.page_size, 50);

        let w = LESSON_PAGINATOR.window(&params(None, Some("abc"))).unwrap();
        assert_eq!(w.page_size, 10);

        let w = LESSON_PAGINATOR.window(&params(None, Some("0"))).unwrap();
        assert_eq!(w.page_size, 10);
    }

    #[test]
    fn malformed_page_is_not_found() {
        assert!(matches!(
            LESSON_PAGINATOR.window(&params(Some("zero"), None)),
            Err(ApiError::NotFound(_))
        ));
        assert!(LESSON_PAGINATOR.window(&params(Some("0"), None)).is_err());
    }

    #[test]
    fn window_offsets() {
        let w = PageWindow { page: 3, page_size: 5 };
        assert_eq!(w.offset(), 10);
        assert_eq!(w.limit(), 5);
    }

    #[test]
    fn links_keep_filters() {
        let req = TestRequest::get()
            .uri("/lessons/?page=2&page_size=5&status=paid")
            .to_http_request();
        let window = PageWindow { page: 2, page_size: 5 };
        let page = LESSON_PAGINATOR
            .page(window, 16, vec![1, 2, 3, 4, 5], &req)
            .unwrap();

        assert_eq!(page.count, 16);
        assert_eq!(
            page.next.as_deref(),
            Some("/lessons/?status=paid&page=3&page_size=5")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("/lessons/?status=paid&page=1&page_size=5")
        );
    }

    #[test]
    fn page_past_the_end_is_rejected() {
        let req = TestRequest::get().uri("/courses/").to_http_request();
        let window = PageWindow { page: 2, page_size: 5 };
        assert!(COURSE_PAGINATOR.page(window, 5, Vec::<u8>::new(), &req).is_err());

        let empty = PageWindow { page: 1, page_size: 5 };
        let page = COURSE_PAGINATOR
            .page(empty, 0, Vec::<u8>::new(), &req)
            .unwrap();
        assert!(page.next.is_none() && page.previous.is_none());
    }
}
