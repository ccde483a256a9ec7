use std::collections::BTreeMap;
use std::path::Path;

use axum::extract::Multipart;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    assets, audit,
    dto::products::{CategoryList, ProductForm, ProductList},
    entity::products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Highlight, Product, ProductAttrs},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    services::{settings_service, validate},
    state::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 12;

/// Product names are unique; `except` skips the product being edited.
async fn ensure_name_free(state: &AppState, name: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut finder = Products::find().filter(Column::Name.eq(name));
    if let Some(id) = except {
        finder = finder.filter(Column::Id.ne(id));
    }
    if finder.one(&state.orm).await?.is_some() {
        return Err(AppError::Conflict(format!("A product named {name} already exists")));
    }
    Ok(())
}

/// Escape `%`, `_` and `\` so user text matches literally under (I)LIKE.
fn like_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize_with(DEFAULT_PAGE_SIZE);
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", like_literal(search));
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern.clone()))
                .add(Expr::col(Column::Brand).ilike(pattern)),
        );
    }

    if let Some(category) = query.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(Expr::col(Column::Category).ilike(like_literal(category)));
    }

    if let Some(brand) = query.brand.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(Expr::col(Column::Brand).ilike(like_literal(brand)));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    match query.in_stock {
        Some(true) => {
            condition = condition
                .add(Column::InStock.eq(true))
                .add(Column::Stock.gt(0));
        }
        Some(false) => {
            condition = condition.add(
                Condition::any()
                    .add(Column::InStock.eq(false))
                    .add(Column::Stock.lte(0)),
            );
        }
        None => {}
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let settings = settings_service::load(&state.orm).await?;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| Product::from_model(model, &state.config.asset_base_url, &settings))
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let model = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let settings = settings_service::load(&state.orm).await?;
    Ok(ApiResponse::success(
        "Product",
        Product::from_model(model, &state.config.asset_base_url, &settings),
        None,
    ))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let rows: Vec<Option<String>> = Products::find()
        .select_only()
        .column(Column::Category)
        .distinct()
        .filter(Column::Category.is_not_null())
        .order_by_asc(Column::Category)
        .into_tuple()
        .all(&state.orm)
        .await?;

    let items = rows
        .into_iter()
        .flatten()
        .filter(|c| !c.trim().is_empty())
        .collect();
    Ok(ApiResponse::item("Categories", CategoryList { items }))
}

/// Create a product from an admin form. Images saved for the form are
/// removed again when the product is rejected.
pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    let uploaded = form.uploaded.clone();
    let result = insert_product(state, user, form).await;
    if result.is_err() {
        discard_uploads(&state.config.upload_dir, &uploaded).await;
    }
    result
}

async fn insert_product(
    state: &AppState,
    user: &AuthUser,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let name = validate::required("name", form.name.as_deref().unwrap_or_default())?;
    let price = form
        .price
        .ok_or_else(|| AppError::BadRequest("price is required".into()))?;
    validate_price(price)?;

    let variants = Variants::normalize(
        form.sizes.unwrap_or_default(),
        form.size_stock.unwrap_or_default(),
        form.stock.unwrap_or(0),
    )?;
    ensure_name_free(state, &name, None).await?;

    let mut images = form.images.unwrap_or_default();
    images.extend(form.uploaded);

    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(validate::optional(form.description)),
        brand: Set(validate::optional(form.brand)),
        category: Set(validate::optional(form.category)),
        price: Set(price),
        stock: Set(variants.stock),
        images: Set(serde_json::json!(images)),
        sizes: Set(serde_json::json!(variants.sizes)),
        size_stock: Set(serde_json::json!(variants.size_stock)),
        highlights: Set(serde_json::json!(form.highlights.unwrap_or_default())),
        in_stock: Set(form.in_stock.unwrap_or(true)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    let settings = settings_service::load(&state.orm).await?;
    Ok(ApiResponse::item(
        "Product created",
        Product::from_model(product, &state.config.asset_base_url, &settings),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    let uploaded = form.uploaded.clone();
    let result = apply_product_update(state, user, id, form).await;
    if result.is_err() {
        discard_uploads(&state.config.upload_dir, &uploaded).await;
    }
    result
}

async fn apply_product_update(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let attrs = ProductAttrs::from_model(&existing);
    let current_stock = existing.stock;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = form.name {
        let name = validate::required("name", &name)?;
        ensure_name_free(state, &name, Some(id)).await?;
        active.name = Set(name);
    }
    if form.description.is_some() {
        active.description = Set(validate::optional(form.description));
    }
    if form.brand.is_some() {
        active.brand = Set(validate::optional(form.brand));
    }
    if form.category.is_some() {
        active.category = Set(validate::optional(form.category));
    }
    if let Some(price) = form.price {
        validate_price(price)?;
        active.price = Set(price);
    }
    if form.sizes.is_some() || form.size_stock.is_some() || form.stock.is_some() {
        let variants = Variants::normalize(
            form.sizes.unwrap_or(attrs.sizes),
            form.size_stock.unwrap_or(attrs.size_stock),
            form.stock.unwrap_or(current_stock),
        )?;
        active.stock = Set(variants.stock);
        active.sizes = Set(serde_json::json!(variants.sizes));
        active.size_stock = Set(serde_json::json!(variants.size_stock));
    }
    if let Some(highlights) = form.highlights {
        active.highlights = Set(serde_json::json!(highlights));
    }
    if let Some(in_stock) = form.in_stock {
        active.in_stock = Set(in_stock);
    }
    if form.images.is_some() || !form.uploaded.is_empty() {
        let mut images = form.images.unwrap_or(attrs.images);
        images.extend(form.uploaded);
        active.images = Set(serde_json::json!(images));
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    let settings = settings_service::load(&state.orm).await?;
    Ok(ApiResponse::item(
        "Updated",
        Product::from_model(product, &state.config.asset_base_url, &settings),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    // cart lines go with the product (ON DELETE CASCADE); order lines keep their snapshot
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::item("Deleted", serde_json::json!({})))
}

/// ₹1,00,00,000 in paise.
const MAX_PRICE: i64 = 1_000_000_000;

fn validate_price(price: i64) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if price > MAX_PRICE {
        return Err(AppError::BadRequest("price is too large".into()));
    }
    Ok(())
}

fn out_of_range() -> AppError {
    AppError::BadRequest("stock out of range".into())
}

fn total_stock(counts: &BTreeMap<String, i32>) -> AppResult<i32> {
    counts
        .values()
        .try_fold(0_i32, |acc, n| acc.checked_add(*n))
        .ok_or_else(out_of_range)
}

/// Sizes and per-size stock with the total derived from them.
#[derive(Debug, PartialEq, Eq)]
pub struct Variants {
    pub sizes: Vec<String>,
    pub size_stock: BTreeMap<String, i32>,
    pub stock: i32,
}

impl Variants {
    /// Trim and dedupe sizes, keep counts only for listed sizes, and derive
    /// the total. Unsized products keep `fallback_stock`.
    pub fn normalize(
        sizes: Vec<String>,
        size_stock: BTreeMap<String, i32>,
        fallback_stock: i32,
    ) -> AppResult<Self> {
        let mut clean: Vec<String> = Vec::new();
        for size in sizes {
            let size = size.trim().to_string();
            if !size.is_empty() && !clean.contains(&size) {
                clean.push(size);
            }
        }

        if clean.is_empty() {
            if fallback_stock < 0 {
                return Err(AppError::BadRequest("stock must not be negative".into()));
            }
            return Ok(Self {
                sizes: clean,
                size_stock: BTreeMap::new(),
                stock: fallback_stock,
            });
        }

        let mut counts = BTreeMap::new();
        for size in &clean {
            let count = size_stock.get(size).copied().unwrap_or(0);
            if count < 0 {
                return Err(AppError::BadRequest(format!(
                    "stock for size {size} must not be negative"
                )));
            }
            counts.insert(size.clone(), count);
        }
        let stock = total_stock(&counts)?;

        Ok(Self {
            sizes: clean,
            size_stock: counts,
            stock,
        })
    }
}

/// Stock after moving `delta` units of `size` in or out. Sized products also
/// return their updated per-size counts.
pub fn shifted_stock(
    model: &ProductModel,
    size: Option<&str>,
    delta: i32,
) -> AppResult<(i32, Option<BTreeMap<String, i32>>)> {
    let attrs = ProductAttrs::from_model(model);
    if attrs.sizes.is_empty() {
        let stock = model.stock.checked_add(delta).ok_or_else(out_of_range)?;
        if stock < 0 {
            return Err(AppError::BadRequest("stock cannot be negative".into()));
        }
        return Ok((stock, None));
    }

    let size = size
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("size is required for this product".into()))?;
    if !attrs.has_size(size) {
        return Err(AppError::BadRequest(format!("Size {size} is not available")));
    }

    let mut counts = attrs.size_stock;
    let count = counts.entry(size.to_string()).or_insert(0);
    *count = count.checked_add(delta).ok_or_else(out_of_range)?;
    if *count < 0 {
        return Err(AppError::BadRequest(format!(
            "stock for size {size} cannot be negative"
        )));
    }
    let stock = total_stock(&counts)?;
    Ok((stock, Some(counts)))
}

/// Active model with the stock shift applied, ready to `update`.
pub fn apply_stock_shift(
    model: ProductModel,
    size: Option<&str>,
    delta: i32,
) -> AppResult<ActiveModel> {
    let (stock, counts) = shifted_stock(&model, size, delta)?;
    let mut active: ActiveModel = model.into();
    active.stock = Set(stock);
    if let Some(counts) = counts {
        let counts = serde_json::to_value(counts).map_err(|e| AppError::Internal(e.into()))?;
        active.size_stock = Set(counts);
    }
    active.updated_at = Set(Utc::now().into());
    Ok(active)
}

/// Read a product form from multipart fields, saving `image` file parts
/// under `upload_dir`.
pub async fn read_product_form(multipart: Multipart, upload_dir: &str) -> AppResult<ProductForm> {
    let mut form = ProductForm::default();
    if let Err(err) = fill_product_form(&mut form, multipart, upload_dir).await {
        discard_uploads(upload_dir, &form.uploaded).await;
        return Err(err);
    }
    Ok(form)
}

async fn fill_product_form(
    form: &mut ProductForm,
    mut multipart: Multipart,
    upload_dir: &str,
) -> AppResult<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" || name == "images[]" || field.file_name().is_some() {
            let original = field.file_name().unwrap_or_default().to_string();
            let ext = assets::image_extension(&original).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "unsupported image type, allowed: {}",
                    assets::ALLOWED_IMAGE_EXTENSIONS.join(", ")
                ))
            })?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            if bytes.is_empty() {
                continue;
            }
            let file_name = format!("{}.{ext}", Uuid::new_v4());
            save_upload(upload_dir, &file_name, &bytes).await?;
            form.uploaded.push(file_name);
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        apply_form_field(form, &name, value)?;
    }
    Ok(())
}

fn apply_form_field(form: &mut ProductForm, name: &str, value: String) -> AppResult<()> {
    let trimmed = value.trim();
    match name {
        "name" => form.name = Some(value),
        "description" => form.description = Some(value),
        "brand" => form.brand = Some(value),
        "category" => form.category = Some(value),
        "price" => form.price = Some(parse_field(name, trimmed)?),
        "stock" => form.stock = Some(parse_field(name, trimmed)?),
        "in_stock" => form.in_stock = Some(parse_field(name, trimmed)?),
        "sizes" => form.sizes = Some(parse_json_field(name, trimmed)?),
        "size_stock" => form.size_stock = Some(parse_json_field(name, trimmed)?),
        "highlights" => form.highlights = Some(parse_json_field::<Vec<Highlight>>(name, trimmed)?),
        "images" => form.images = Some(parse_json_field(name, trimmed)?),
        other => tracing::debug!(field = other, "ignoring unknown product form field"),
    }
    Ok(())
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> AppResult<T> {
    value
        .parse::<T>()
        .map_err(|_| AppError::BadRequest(format!("{name} is invalid")))
}

fn parse_json_field<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> AppResult<T> {
    serde_json::from_str(value).map_err(|_| AppError::BadRequest(format!("{name} must be JSON")))
}

async fn save_upload(upload_dir: &str, file_name: &str, bytes: &[u8]) -> AppResult<()> {
    let dir = Path::new(upload_dir);
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    tokio::fs::write(dir.join(file_name), bytes)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    tracing::debug!(file = file_name, size = bytes.len(), "image uploaded");
    Ok(())
}

/// Remove files saved for a request that was then rejected.
pub async fn discard_uploads(upload_dir: &str, files: &[String]) {
    for file in files {
        if let Err(err) = tokio::fs::remove_file(Path::new(upload_dir).join(file)).await {
            tracing::warn!(file = %file, error = %err, "orphan upload not removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_match_wildcards_literally() {
        assert_eq!(like_literal("Kurtas"), "Kurtas");
        assert_eq!(like_literal("%"), "\\%");
        assert_eq!(like_literal("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn unsized_products_keep_their_stock() {
        let v = Variants::normalize(vec![], BTreeMap::new(), 7).unwrap();
        assert_eq!(v.stock, 7);
        assert!(v.sizes.is_empty());
        assert!(Variants::normalize(vec![], BTreeMap::new(), -1).is_err());
    }

    #[test]
    fn sized_stock_is_summed_over_listed_sizes() {
        let counts = BTreeMap::from([
            ("S".to_string(), 2),
            ("M".to_string(), 3),
            ("XXL".to_string(), 50),
        ]);
        let v = Variants::normalize(
            vec![" S".into(), "M".into(), "L".into(), "S".into()],
            counts,
            999,
        )
        .unwrap();
        assert_eq!(v.sizes, vec!["S", "M", "L"]);
        assert_eq!(v.stock, 5);
        assert_eq!(v.size_stock.get("L"), Some(&0));
        assert!(!v.size_stock.contains_key("XXL"));
    }

    #[test]
    fn negative_size_stock_is_rejected() {
        let counts = BTreeMap::from([("S".to_string(), -1)]);
        assert!(Variants::normalize(vec!["S".into()], counts, 0).is_err());
    }

    fn product(
        sizes: serde_json::Value,
        size_stock: serde_json::Value,
        stock: i32,
    ) -> ProductModel {
        let now = Utc::now().fixed_offset();
        ProductModel {
            id: Uuid::new_v4(),
            name: "Kurta".into(),
            description: None,
            brand: None,
            category: None,
            price: 79_900,
            stock,
            images: serde_json::json!([]),
            sizes,
            size_stock,
            highlights: serde_json::json!([]),
            in_stock: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stock_shift_moves_the_size_and_total() {
        let p = product(
            serde_json::json!(["S", "M"]),
            serde_json::json!({ "S": 2, "M": 3 }),
            5,
        );
        let (stock, counts) = shifted_stock(&p, Some("M"), -2).unwrap();
        assert_eq!(stock, 3);
        assert_eq!(counts.unwrap().get("M"), Some(&1));

        assert!(shifted_stock(&p, Some("S"), -3).is_err());
        assert!(shifted_stock(&p, None, 1).is_err());
        assert!(shifted_stock(&p, Some("XL"), 1).is_err());
    }

    #[test]
    fn unsized_stock_shift_uses_the_total() {
        let p = product(serde_json::json!([]), serde_json::json!({}), 2);
        assert_eq!(shifted_stock(&p, None, 4).unwrap(), (6, None));
        assert!(shifted_stock(&p, None, -3).is_err());
    }

    #[test]
    fn oversized_stock_shifts_are_bad_requests() {
        let p = product(serde_json::json!([]), serde_json::json!({}), 5);
        let err = shifted_stock(&p, None, i32::MAX).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "stock out of range"));

        let p = product(
            serde_json::json!(["S", "M"]),
            serde_json::json!({ "S": 1, "M": 1 }),
            2,
        );
        assert!(shifted_stock(&p, Some("S"), i32::MAX).is_err());
        assert!(shifted_stock(&p, Some("S"), i32::MAX - 1).is_err());
    }

    #[test]
    fn size_stock_totals_that_overflow_are_rejected() {
        let counts = BTreeMap::from([("S".to_string(), i32::MAX), ("M".to_string(), 1)]);
        let err = Variants::normalize(vec!["S".into(), "M".into()], counts, 0).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "stock out of range"));
    }

    #[test]
    fn prices_are_bounded() {
        assert!(validate_price(79_900).is_ok());
        assert!(validate_price(-1).is_err());
        assert!(validate_price(i64::MAX).is_err());
    }

    #[test]
    fn form_fields_parse_into_typed_values() {
        let mut form = ProductForm::default();
        apply_form_field(&mut form, "price", " 79900 ".into()).unwrap();
        apply_form_field(&mut form, "in_stock", "false".into()).unwrap();
        apply_form_field(&mut form, "sizes", r#"["S","M"]"#.into()).unwrap();
        apply_form_field(&mut form, "size_stock", r#"{"S":1,"M":2}"#.into()).unwrap();
        apply_form_field(
            &mut form,
            "highlights",
            r#"[{"icon":"leaf","text":"Organic"}]"#.into(),
        )
        .unwrap();
        assert_eq!(form.price, Some(79_900));
        assert_eq!(form.in_stock, Some(false));
        assert_eq!(form.sizes.as_deref(), Some(&["S".to_string(), "M".to_string()][..]));
        assert_eq!(form.size_stock.unwrap().get("M"), Some(&2));
        assert_eq!(form.highlights.unwrap()[0].icon, "leaf");
    }

    #[test]
    fn malformed_form_fields_are_bad_requests() {
        let mut form = ProductForm::default();
        assert!(apply_form_field(&mut form, "price", "12.5".into()).is_err());
        assert!(apply_form_field(&mut form, "sizes", "S,M".into()).is_err());
    }
}
