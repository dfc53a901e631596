use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stop on the route. `order_index` grows strictly from origin to terminus.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub order_index: i32,
}

impl Station {
    /// True when `self` comes before `other` along the route.
    pub fn precedes(&self, other: &Station) -> bool {
        self.order_index < other.order_index
    }
}
