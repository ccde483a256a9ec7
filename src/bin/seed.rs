//! Demo catalogue and accounts for local development.

use anyhow::Context;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, EntityTrait, Set, sea_query::OnConflict};
use serde_json::json;
use shopfront_api::{
    db::{OrmConn, create_orm_conn, run_migrations},
    entity::{
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        settings::{ActiveModel as SettingsActive, Entity as SettingsRow},
    },
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
    services::auth_service::ensure_user_with_role,
};
use uuid::Uuid;

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    brand: &'static str,
    category: &'static str,
    price: i64,
    sizes: &'static [(&'static str, i32)],
    stock: i32,
    image: &'static str,
    highlights: &'static [(&'static str, &'static str)],
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        name: "Handloom Cotton Kurta",
        description: "Breathable handloom cotton with a relaxed straight cut.",
        brand: "Loomcraft",
        category: "Kurtas",
        price: 129_900,
        sizes: &[("S", 6), ("M", 10), ("L", 8), ("XL", 4)],
        stock: 0,
        image: "kurta-indigo.jpg",
        highlights: &[("leaf", "100% cotton"), ("hand", "Handwoven")],
    },
    SeedProduct {
        name: "Block Print Dupatta",
        description: "Hand block printed mulmul dupatta in natural dyes.",
        brand: "Loomcraft",
        category: "Dupattas",
        price: 69_900,
        sizes: &[],
        stock: 25,
        image: "dupatta-block.jpg",
        highlights: &[("droplet", "Natural dyes")],
    },
    SeedProduct {
        name: "Linen Nehru Jacket",
        description: "Lightweight linen jacket with wooden buttons.",
        brand: "Saathi",
        category: "Jackets",
        price: 249_900,
        sizes: &[("M", 3), ("L", 2)],
        stock: 0,
        image: "nehru-linen.jpg",
        highlights: &[("sun", "Summer weight"), ("scissors", "Tailored fit")],
    },
    SeedProduct {
        name: "Khadi Tote Bag",
        description: "Sturdy khadi tote with an inner pocket.",
        brand: "Saathi",
        category: "Accessories",
        price: 39_900,
        sizes: &[],
        stock: 3,
        image: "tote-khadi.jpg",
        highlights: &[("recycle", "Reusable")],
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shopfront_api=debug".into()),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    let admin_id =
        ensure_user_with_role(&orm, "Admin", "admin@example.com", "admin123", ROLE_ADMIN).await?;
    let user_id =
        ensure_user_with_role(&orm, "Demo Shopper", "user@example.com", "user123", ROLE_USER)
            .await?;
    let inserted = seed_products(&orm).await?;
    seed_settings(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}, new products: {inserted}");
    Ok(())
}

async fn seed_products(orm: &OrmConn) -> anyhow::Result<u64> {
    let mut inserted = 0;
    for product in PRODUCTS {
        let sizes: Vec<&str> = product.sizes.iter().map(|(size, _)| *size).collect();
        let size_stock: serde_json::Map<String, serde_json::Value> = product
            .sizes
            .iter()
            .map(|(size, count)| (size.to_string(), json!(count)))
            .collect();
        let stock = if product.sizes.is_empty() {
            product.stock
        } else {
            product.sizes.iter().map(|(_, count)| count).sum()
        };
        let highlights: Vec<_> = product
            .highlights
            .iter()
            .map(|(icon, text)| json!({ "icon": icon, "text": text }))
            .collect();

        let model = ProductActive {
            id: Set(Uuid::new_v4()),
            name: Set(product.name.to_string()),
            description: Set(Some(product.description.to_string())),
            brand: Set(Some(product.brand.to_string())),
            category: Set(Some(product.category.to_string())),
            price: Set(product.price),
            stock: Set(stock),
            images: Set(json!([product.image])),
            sizes: Set(json!(sizes)),
            size_stock: Set(serde_json::Value::Object(size_stock)),
            highlights: Set(json!(highlights)),
            in_stock: Set(true),
            created_at: NotSet,
            updated_at: NotSet,
        };

        inserted += Products::insert(model)
            .on_conflict(OnConflict::column(ProdCol::Name).do_nothing().to_owned())
            .exec_without_returning(orm)
            .await?;
    }

    println!("Seeded products");
    Ok(inserted)
}

/// Turn on a demo banner unless one has already been written.
async fn seed_settings(orm: &OrmConn) -> anyhow::Result<()> {
    let row = SettingsRow::find_by_id(1)
        .one(orm)
        .await?
        .context("settings row missing; run migrations first")?;
    if row.banner_text.is_some() {
        return Ok(());
    }

    let mut active: SettingsActive = row.into();
    active.banner_text = Set(Some("Free shipping on every order".into()));
    active.banner_enabled = Set(true);
    active.updated_at = Set(Utc::now().into());
    active.update(orm).await?;
    Ok(())
}
