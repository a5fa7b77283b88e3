use gantry::{BelongsTo, Entity, HasMany};

/// The classic identity-keyed entity with a renamed column.
#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[gantry(table = "Users", schema = "dbo")]
pub struct User {
    #[gantry(key, generated = "identity")]
    pub id: i32,
    #[gantry(column = "username", required, length(2, 50))]
    pub name: String,
    pub is_active: bool,
}

#[derive(Entity, Debug, Clone, Default)]
#[gantry(table = "Customers", schema = "dbo")]
pub struct Customer {
    #[gantry(key)]
    pub id: i32,
    pub name: String,
    #[gantry(foreign_key = "customer_id")]
    pub orders: HasMany<Order>,
}

#[derive(Entity, Debug, Clone, Default)]
#[gantry(table = "Orders", schema = "dbo")]
pub struct Order {
    #[gantry(key)]
    pub id: i32,
    pub customer_id: i32,
    #[gantry(foreign_key = "customer_id", inverse = "orders")]
    pub customer: BelongsTo<Customer>,
    #[gantry(foreign_key = "order_id")]
    pub lines: HasMany<OrderLine>,
}

#[derive(Entity, Debug, Clone, Default)]
#[gantry(table = "OrderLines", schema = "dbo")]
pub struct OrderLine {
    #[gantry(key)]
    pub id: i32,
    pub order_id: i32,
    pub sku: String,
}

/// Composite key drawn from two Oracle sequences.
#[derive(Entity, Debug, Clone, Default)]
#[gantry(table = "Accounts")]
pub struct Account {
    #[gantry(key, sequence = "tenant_seq")]
    pub tenant_id: i64,
    #[gantry(key, sequence = "user_seq")]
    pub user_id: i64,
    #[gantry(column = "username")]
    pub name: String,
}

/// Read-only projection: no writes are generated or accepted.
#[derive(Entity, Debug, Clone, Default)]
#[gantry(table = "UserStats", schema = "dbo", read_only)]
pub struct UserStats {
    #[gantry(key)]
    pub user_id: i32,
    pub order_count: i64,
}
