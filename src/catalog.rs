//! Read-only lookups the engine needs from the surrounding system: who belongs
//! to which group, and display names for stores, products and users.

use crate::model::{GroupId, ProductId, StoreId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    async fn is_member(&self, group: GroupId, user: UserId) -> bool;

    async fn store_name(&self, store: StoreId) -> Option<String>;

    async fn product_name(&self, product: ProductId) -> Option<String>;

    async fn user_name(&self, user: UserId) -> Option<String>;
}

/// A fixed catalog, filled in up front.
///
/// ```
/// use group_run::catalog::StaticCatalog;
/// use group_run::model::{GroupId, UserId};
///
/// let catalog = StaticCatalog::new()
///     .with_user(UserId(1), "Alice")
///     .with_member(GroupId(1), UserId(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    members: HashSet<(GroupId, UserId)>,
    stores: HashMap<StoreId, String>,
    products: HashMap<ProductId, String>,
    users: HashMap<UserId, String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, group: GroupId, user: UserId) -> Self {
        self.members.insert((group, user));
        self
    }

    pub fn with_store(mut self, store: StoreId, name: impl Into<String>) -> Self {
        self.stores.insert(store, name.into());
        self
    }

    pub fn with_product(mut self, product: ProductId, name: impl Into<String>) -> Self {
        self.products.insert(product, name.into());
        self
    }

    pub fn with_user(mut self, user: UserId, name: impl Into<String>) -> Self {
        self.users.insert(user, name.into());
        self
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn is_member(&self, group: GroupId, user: UserId) -> bool {
        self.members.contains(&(group, user))
    }

    async fn store_name(&self, store: StoreId) -> Option<String> {
        self.stores.get(&store).cloned()
    }

    async fn product_name(&self, product: ProductId) -> Option<String> {
        self.products.get(&product).cloned()
    }

    async fn user_name(&self, user: UserId) -> Option<String> {
        self.users.get(&user).cloned()
    }
}
