//! [`CollectionFetcher`] implementation over the REST client.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use estate_core::{CollectionFetcher, Entity, PageResult, Query, Result};

use crate::rest::RestClient;

/// Fetcher for the collection of `T`, sharing one [`RestClient`].
pub struct EntityFetcher<T> {
    client: Arc<RestClient>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityFetcher<T> {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self {
            client,
            _entity: PhantomData,
        }
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }
}

impl<T> Clone for EntityFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Entity> CollectionFetcher<T> for EntityFetcher<T> {
    async fn fetch(&self, query: &Query) -> Result<PageResult<T>> {
        self.client.fetch_page::<T>(query).await
    }
}
