use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    pub en_name: String,

    /// Slug derived from `name`
    #[sea_orm(unique)]
    pub url: String,

    pub brand: String,

    pub code: String,

    pub category: String,

    /// JSON array of material names
    pub materials: String,

    /// Whole currency units
    pub price: i64,

    pub public: bool,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_colors::Entity")]
    ProductColors,
    #[sea_orm(has_many = "super::product_assets::Entity")]
    ProductAssets,
    #[sea_orm(has_many = "super::cart_items::Entity")]
    CartItems,
}

impl Related<super::product_colors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductColors.def()
    }
}

impl Related<super::product_assets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductAssets.def()
    }
}

impl Related<super::cart_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
