//! Create or promote the dashboard admin.
//!
//! `create_admin [email] [password] [name]`; missing arguments fall back to
//! `ADMIN_EMAIL`, `ADMIN_PASSWORD` and `ADMIN_NAME`.

use anyhow::Context;
use shopfront_api::{
    db::{create_orm_conn, run_migrations},
    middleware::auth::ROLE_ADMIN,
    services::auth_service::ensure_user_with_role,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shopfront_api=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let email = args
        .next()
        .or_else(|| std::env::var("ADMIN_EMAIL").ok())
        .context("pass an email or set ADMIN_EMAIL")?;
    let password = args
        .next()
        .or_else(|| std::env::var("ADMIN_PASSWORD").ok())
        .context("pass a password or set ADMIN_PASSWORD")?;
    let name = args
        .next()
        .or_else(|| std::env::var("ADMIN_NAME").ok())
        .unwrap_or_else(|| "Admin".to_string());

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user_with_role(&orm, &name, &email, &password, ROLE_ADMIN).await?;

    println!("Admin ready: {email} ({admin_id})");
    Ok(())
}
