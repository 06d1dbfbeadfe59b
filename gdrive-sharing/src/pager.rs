//! Flattens cursor-paginated listings into a pull-based item sequence.

use std::collections::VecDeque;

use gdrive_core::{DriveError, ListRequest, Page, Permission, RemoteObject};

use crate::remote::RemoteObjectService;

/// One kind of paged listing: knows which call to make and which part of the
/// response carries the items.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    type Item;

    async fn fetch(&mut self, request: &ListRequest) -> Result<Page<Self::Item>, DriveError>;
}

/// Default cursor advance: follow `nextPageToken` until it disappears.
pub fn follow_token<T>(request: &ListRequest, page: &Page<T>) -> Option<ListRequest> {
    request.next_page(page.next_page_token.as_deref())
}

/// Single-pass sequence over every item of every page.
///
/// Pages are fetched lazily, one remote call each, only when the buffered
/// items run out. Stopping early never fetches the remaining pages. There is
/// no rewind; iterating again means building a new pager.
pub struct Pager<P: PageSource, N> {
    source: P,
    next: N,
    request: Option<ListRequest>,
    buffer: VecDeque<P::Item>,
    pages_fetched: usize,
}

impl<P, N> Pager<P, N>
where
    P: PageSource,
    N: FnMut(&ListRequest, &Page<P::Item>) -> Option<ListRequest>,
{
    pub fn new(source: P, initial: ListRequest, next: N) -> Self {
        Self {
            source,
            next,
            request: Some(initial),
            buffer: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    /// Whether another item may still be produced without a fetch failing.
    pub fn has_more(&self) -> bool {
        !self.buffer.is_empty() || self.request.is_some()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub async fn try_next(&mut self) -> Result<Option<P::Item>, DriveError> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            let Some(request) = self.request.take() else {
                return Ok(None);
            };
            let page = self.source.fetch(&request).await?;
            self.pages_fetched += 1;
            self.request = (self.next)(&request, &page);
            self.buffer.extend(page.items);
        }
    }

    pub async fn try_collect(mut self) -> Result<Vec<P::Item>, DriveError> {
        let mut items = Vec::new();
        while let Some(item) = self.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

pub type NextRequest<T> = fn(&ListRequest, &Page<T>) -> Option<ListRequest>;

pub type TokenPager<P> = Pager<P, NextRequest<<P as PageSource>::Item>>;

pub struct ObjectListing<'a, S> {
    service: &'a S,
}

impl<S: RemoteObjectService> PageSource for ObjectListing<'_, S> {
    type Item = RemoteObject;

    async fn fetch(&mut self, request: &ListRequest) -> Result<Page<RemoteObject>, DriveError> {
        self.service.list_objects(request).await
    }
}

pub struct PermissionListing<'a, S> {
    service: &'a S,
    object_id: String,
}

impl<S: RemoteObjectService> PageSource for PermissionListing<'_, S> {
    type Item = Permission;

    async fn fetch(&mut self, request: &ListRequest) -> Result<Page<Permission>, DriveError> {
        self.service
            .list_permissions(&self.object_id, request)
            .await
    }
}

pub fn objects<S: RemoteObjectService>(
    service: &S,
    request: ListRequest,
) -> TokenPager<ObjectListing<'_, S>> {
    Pager::new(
        ObjectListing { service },
        request,
        follow_token as NextRequest<RemoteObject>,
    )
}

pub fn permissions<'a, S: RemoteObjectService>(
    service: &'a S,
    object_id: &str,
    page_size: u32,
) -> TokenPager<PermissionListing<'a, S>> {
    Pager::new(
        PermissionListing {
            service,
            object_id: object_id.to_string(),
        },
        ListRequest::default().with_page_size(page_size),
        follow_token as NextRequest<Permission>,
    )
}
