//! One column of each common storage type.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_gadget")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub label: String,
    pub small: i16,
    pub big: i64,
    pub ratio: f64,
    pub price: Decimal,
    pub born: Date,
    pub seen_at: DateTimeWithTimeZone,
    pub payload: Json,
    pub raw: Vec<u8>,
    pub note: Option<String>,
    #[sea_orm(column_type = "Inet")]
    pub address: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
