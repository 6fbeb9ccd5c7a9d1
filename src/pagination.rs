// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! `page` / `page_size` query parameters and the list-response headers.

use crate::{error::RegistryError, models::Page};
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header::LINK, request::Parts, HeaderMap, HeaderName, HeaderValue, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 500;
/// Highest page whose window still fits a signed 64-bit offset.
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PAGE_SIZE;

pub static X_TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");

#[derive(Debug, Default, Deserialize)]
struct PageParams {
    page: Option<String>,
    page_size: Option<String>,
}

/// Parse `page` (1-based, default 1) and `page_size` (default 10, at most 500).
/// Non-positive values fall back to the defaults; non-numeric values are rejected.
pub fn page_from_uri(uri: &Uri) -> Result<Page, RegistryError> {
    let params = Query::<PageParams>::try_from_uri(uri)
        .map(|q| q.0)
        .unwrap_or_default();

    let page = match params.page.as_deref().map(str::trim) {
        None | Some("") => 1,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| RegistryError::BadInput(format!("invalid page: {raw}")))?,
    };
    let size = match params.page_size.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_PAGE_SIZE as i64,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| RegistryError::BadInput(format!("invalid page_size: {raw}")))?,
    };

    let page = if page <= 0 { 1 } else { page as u64 };
    if page > MAX_PAGE {
        return Err(RegistryError::BadInput(format!(
            "page must not exceed {MAX_PAGE}"
        )));
    }
    let size = if size <= 0 {
        DEFAULT_PAGE_SIZE
    } else if size as u64 > MAX_PAGE_SIZE {
        tracing::debug!("page_size {size} exceeds the maximum, using {MAX_PAGE_SIZE}");
        MAX_PAGE_SIZE
    } else {
        size as u64
    };
    Ok(Page { page, size })
}

/// Extractor for the pagination parameters of a list endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Pagination(pub Page);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Pagination {
    type Rejection = RegistryError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        page_from_uri(&parts.uri).map(Pagination)
    }
}

/// `X-Total-Count` plus a `Link` header with `prev` / `next` where they exist.
pub fn pagination_headers(uri: &Uri, total: i64, page: Page) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_TOTAL_COUNT.clone(), HeaderValue::from(total));

    let mut links = Vec::new();
    if page.page > 1 {
        links.push(format!("<{}>; rel=\"prev\"", page_link(uri, page.page - 1, page.size)));
    }
    if page.page.saturating_mul(page.size) < total.max(0) as u64 {
        links.push(format!("<{}>; rel=\"next\"", page_link(uri, page.page + 1, page.size)));
    }
    if !links.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&links.join(" , ")) {
            headers.insert(LINK, value);
        }
    }
    headers
}

/// The request's own path and query with `page` and `page_size` replaced.
fn page_link(uri: &Uri, page: u64, size: u64) -> String {
    let mut query: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            key != "page" && key != "page_size"
        })
        .map(str::to_string)
        .collect();
    query.push(format!("page={page}"));
    query.push(format!("page_size={size}"));
    format!("{}?{}", uri.path(), query.join("&"))
}

/// One page of a list, rendered as a JSON array with pagination headers.
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: Page,
    pub uri: Uri,
}

impl<T: Serialize> IntoResponse for Paginated<T> {
    fn into_response(self) -> Response {
        let headers = pagination_headers(&self.uri, self.total, self.page);
        (headers, Json(self.items)).into_response()
    }
}
