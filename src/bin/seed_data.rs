//! Seed data script - populates the promo code table
//!
//! Run with: cargo run --bin seed-data
//!
//! Safe to run repeatedly: existing codes are left untouched.

use tracing::info;

use storefront_api::{
    config, db,
    entities::PromoKind,
    services::promotions::{PromoRule, PromotionService},
};

fn demo_codes() -> Vec<PromoRule> {
    vec![
        PromoRule::reserved(),
        PromoRule {
            code: "PICKUP5".to_string(),
            kind: PromoKind::Percent,
            value: 5,
            min_total: 0,
        },
        PromoRule {
            code: "SAVE300".to_string(),
            kind: PromoKind::Fixed,
            value: 30_000,
            min_total: 150_000,
        },
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Storefront Seed Data ===");

    let cfg = config::load_config()?;
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url.clone());
    let pool = db::establish_connection(&database_url).await?;
    if cfg.auto_migrate {
        db::run_migrations(&pool).await?;
    }

    let promotions = PromotionService::new(pool);
    let mut created = 0;
    for rule in demo_codes() {
        if promotions.ensure_code(&rule).await? {
            info!("  Created promo code {}", rule.code);
            created += 1;
        } else {
            info!("  Promo code {} already exists", rule.code);
        }
    }

    info!("Seeding complete: {} promo code(s) created", created);
    Ok(())
}
