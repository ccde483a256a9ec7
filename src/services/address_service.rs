use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
    entity::{
        addresses::{
            ActiveModel as AddressActive, Column as AddrCol, Entity as Addresses,
            Model as AddressModel,
        },
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Address,
    response::{ApiResponse, Meta},
    services::validate,
    state::AppState,
};

const DEFAULT_COUNTRY: &str = "India";

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items: Vec<Address> = Addresses::find()
        .filter(AddrCol::UserId.eq(user.user_id))
        .order_by_desc(AddrCol::IsDefault)
        .order_by_desc(AddrCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Address::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Addresses",
        AddressList { items },
        Some(Meta::new(1, total, total)),
    ))
}

/// Fetch one of the user's addresses.
pub async fn find_own<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    id: Uuid,
) -> AppResult<AddressModel> {
    Addresses::find()
        .filter(AddrCol::Id.eq(id))
        .filter(AddrCol::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn find_default<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
) -> AppResult<Option<AddressModel>> {
    Ok(Addresses::find()
        .filter(AddrCol::UserId.eq(user_id))
        .filter(AddrCol::IsDefault.eq(true))
        .one(db)
        .await?)
}

/// Lock the owner's user row so default switches for one user run one at a
/// time, including while the user has no addresses yet.
async fn lock_address_book<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<()> {
    Users::find_by_id(user_id)
        .lock(LockType::Update)
        .one(db)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(())
}

/// Clear the default flag on every address of the user except `keep`.
async fn demote_others<C: ConnectionTrait>(db: &C, user_id: Uuid, keep: Uuid) -> AppResult<()> {
    Addresses::update_many()
        .col_expr(AddrCol::IsDefault, Expr::value(false))
        .col_expr(AddrCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(AddrCol::UserId.eq(user_id))
        .filter(AddrCol::Id.ne(keep))
        .filter(AddrCol::IsDefault.eq(true))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: CreateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let id = Uuid::new_v4();
    let mut address = AddressActive {
        id: Set(id),
        user_id: Set(user.user_id),
        name: Set(validate::required("name", &payload.name)?),
        phone: Set(validate::phone(&payload.phone)?),
        line1: Set(validate::required("line1", &payload.line1)?),
        line2: Set(validate::optional(payload.line2)),
        landmark: Set(validate::optional(payload.landmark)),
        city: Set(validate::required("city", &payload.city)?),
        state: Set(validate::required("state", &payload.state)?),
        postal_code: Set(validate::postal_code(&payload.postal_code)?),
        country: Set(
            validate::optional(payload.country).unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        ),
        label: Set(validate::optional(payload.label)),
        is_default: Set(false),
        created_at: NotSet,
        updated_at: NotSet,
    };

    let txn = state.orm.begin().await?;
    lock_address_book(&txn, user.user_id).await?;
    let existing = Addresses::find()
        .filter(AddrCol::UserId.eq(user.user_id))
        .count(&txn)
        .await?;
    let make_default = payload.is_default || existing == 0;

    if make_default {
        demote_others(&txn, user.user_id, id).await?;
    }
    address.is_default = Set(make_default);

    let address = address.insert(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "address_create",
        "addresses",
        serde_json::json!({ "address_id": address.id, "is_default": address.is_default }),
    )
    .await;

    Ok(ApiResponse::item("Address saved", Address::from(address)))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let txn = state.orm.begin().await?;
    lock_address_book(&txn, user.user_id).await?;
    let existing = find_own(&txn, user.user_id, id).await?;
    let was_default = existing.is_default;

    let mut active: AddressActive = existing.into();
    if let Some(v) = payload.name {
        active.name = Set(validate::required("name", &v)?);
    }
    if let Some(v) = payload.phone {
        active.phone = Set(validate::phone(&v)?);
    }
    if let Some(v) = payload.line1 {
        active.line1 = Set(validate::required("line1", &v)?);
    }
    if payload.line2.is_some() {
        active.line2 = Set(validate::optional(payload.line2));
    }
    if payload.landmark.is_some() {
        active.landmark = Set(validate::optional(payload.landmark));
    }
    if let Some(v) = payload.city {
        active.city = Set(validate::required("city", &v)?);
    }
    if let Some(v) = payload.state {
        active.state = Set(validate::required("state", &v)?);
    }
    if let Some(v) = payload.postal_code {
        active.postal_code = Set(validate::postal_code(&v)?);
    }
    if let Some(v) = payload.country {
        active.country = Set(validate::required("country", &v)?);
    }
    if payload.label.is_some() {
        active.label = Set(validate::optional(payload.label));
    }
    match payload.is_default {
        Some(true) if !was_default => {
            demote_others(&txn, user.user_id, id).await?;
            active.is_default = Set(true);
        }
        Some(false) if was_default => {
            return Err(AppError::BadRequest(
                "Choose another default address instead".into(),
            ));
        }
        _ => {}
    }
    active.updated_at = Set(Utc::now().into());

    let address = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "address_update",
        "addresses",
        serde_json::json!({ "address_id": address.id }),
    )
    .await;

    Ok(ApiResponse::item("Address updated", Address::from(address)))
}

pub async fn set_default_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Address>> {
    let txn = state.orm.begin().await?;
    let address = make_default(&txn, user.user_id, id).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "address_default",
        "addresses",
        serde_json::json!({ "address_id": address.id }),
    )
    .await;

    Ok(ApiResponse::item("Default address updated", Address::from(address)))
}

/// Flag `id` as the user's only default address. Runs inside the caller's transaction.
pub async fn make_default<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    id: Uuid,
) -> AppResult<AddressModel> {
    lock_address_book(db, user_id).await?;
    let address = find_own(db, user_id, id).await?;
    if address.is_default {
        return Ok(address);
    }
    demote_others(db, user_id, id).await?;

    let mut active: AddressActive = address.into();
    active.is_default = Set(true);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(db).await?)
}

pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    lock_address_book(&txn, user.user_id).await?;
    let address = find_own(&txn, user.user_id, id).await?;
    Addresses::delete_by_id(address.id).exec(&txn).await?;

    let mut promoted = None;
    if address.is_default {
        let next = Addresses::find()
            .filter(AddrCol::UserId.eq(user.user_id))
            .order_by_desc(AddrCol::CreatedAt)
            .one(&txn)
            .await?;
        if let Some(next) = next {
            promoted = Some(next.id);
            let mut active: AddressActive = next.into();
            active.is_default = Set(true);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?;
        }
    }
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "address_delete",
        "addresses",
        serde_json::json!({ "address_id": id, "promoted": promoted }),
    )
    .await;

    Ok(ApiResponse::item(
        "Address deleted",
        serde_json::json!({ "default_address_id": promoted }),
    ))
}
