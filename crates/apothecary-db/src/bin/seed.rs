//! # Seed Data Generator
//!
//! Populates the database with a starter pharmacy catalogue for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./apothecary.db (or $APOTHECARY_DB_PATH)
//! cargo run -p apothecary-db --bin seed
//!
//! # Specify database path, start from an empty file
//! cargo run -p apothecary-db --bin seed -- --db ./data/pos.db --reset
//!
//! # Also ring up and retract one sale through the engine
//! cargo run -p apothecary-db --bin seed -- --demo-sale
//! ```
//!
//! ## Seeded Records
//! - Users: `admin` (admin), `cashier1` (cashier)
//! - Categories: Pain Relief, Vitamins, Antibiotics, Cold & Flu, Medical Devices
//! - Five products with stock, supplier and expiry dates

use std::path::{Path, PathBuf};

use apothecary_core::{NewProduct, PaymentMethod, Role, SaleLineRequest};
use apothecary_db::{AppConfig, Database, SaleEngine};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "seed", about = "Apothecary POS seed data generator")]
struct Args {
    /// Database file path
    #[arg(long, short = 'd', env = "APOTHECARY_DB_PATH", default_value = "apothecary.db")]
    db: PathBuf,

    /// Delete the database file before seeding
    #[arg(long)]
    reset: bool,

    /// Commit and retract one sale to exercise the engine
    #[arg(long)]
    demo_sale: bool,
}

/// (category, name, sku, price, base price, stock, expiry, supplier)
type ProductSeed = (
    &'static str,
    &'static str,
    &'static str,
    i64,
    i64,
    i64,
    Option<(i32, u32, u32)>,
    &'static str,
);

const CATEGORIES: &[&str] = &[
    "Pain Relief",
    "Vitamins",
    "Antibiotics",
    "Cold & Flu",
    "Medical Devices",
];

const PRODUCTS: &[ProductSeed] = &[
    ("Pain Relief", "Paracetamol 500mg", "PC500", 5_000, 3_500, 150, Some((2026, 12, 31)), "Pharma Inc."),
    ("Vitamins", "Vitamin C 1000mg", "VC1000", 25_000, 17_500, 200, Some((2025, 8, 15)), "Healthy Living Co."),
    ("Antibiotics", "Amoxicillin 250mg", "AMX250", 15_000, 10_500, 80, Some((2025, 10, 1)), "Pharma Inc."),
    ("Cold & Flu", "Cough Syrup 60ml", "CS60", 22_000, 15_400, 60, Some((2026, 5, 20)), "Med Solutions"),
    ("Medical Devices", "Digital Thermometer", "DT01", 75_000, 52_500, 40, None, "Med Solutions"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,apothecary=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = AppConfig {
        db_path: args.db.clone(),
        ..AppConfig::load()?
    };

    if args.reset {
        remove_database(&config.db_path)?;
    }

    info!(path = %config.db_path.display(), "Seeding database");
    let db = Database::new(config.db_config()).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed (use --reset to regenerate)");
    } else {
        seed(&db).await?;
    }

    if args.demo_sale {
        demo_sale(&db, &config).await?;
    }

    db.close().await;
    Ok(())
}

async fn seed(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    db.users().create("admin", Role::Admin).await?;
    db.users().create("cashier1", Role::Cashier).await?;
    info!("Created users admin, cashier1");

    for name in CATEGORIES {
        db.categories().create(name).await?;
    }
    info!(count = CATEGORIES.len(), "Created categories");

    for (category, name, sku, price, base, stock, expiry, supplier) in PRODUCTS {
        let category_id = db.categories().get_by_name(category).await?.map(|c| c.id);
        let expiry_date = expiry.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));

        let product = db
            .products()
            .create(&NewProduct {
                name: name.to_string(),
                sku: sku.to_string(),
                category_id,
                base_price_minor: *base,
                price_minor: *price,
                stock: *stock,
                expiry_date,
                supplier: Some(supplier.to_string()),
            })
            .await?;
        info!(sku = %product.sku, price = %product.price(), stock = product.stock, "Created product");
    }

    Ok(())
}

async fn demo_sale(db: &Database, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cashier = db
        .users()
        .get_by_username("cashier1")
        .await?
        .ok_or("cashier1 is missing, seed an empty database first")?;
    let paracetamol = db.products().get_by_sku("PC500").await?.ok_or("PC500 is missing")?;
    let thermometer = db.products().get_by_sku("DT01").await?.ok_or("DT01 is missing")?;

    let engine = SaleEngine::new(db.clone()).with_retry_policy(config.retry_policy());

    let receipt = engine
        .commit_sale(
            &cashier.id,
            &[
                SaleLineRequest::new(&paracetamol.id, 2),
                SaleLineRequest::new(&thermometer.id, 1),
            ],
            PaymentMethod::Cash,
        )
        .await?;
    info!(
        sale_id = %receipt.sale.id,
        cashier = %receipt.cashier.username,
        total = %receipt.sale.total_amount(),
        "Demo sale committed"
    );

    let retracted = engine.retract_sale(&receipt.sale.id).await?;
    info!(sale_id = %retracted.id, status = %retracted.status, "Demo sale retracted");

    let report = engine.sales_report(None, None).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn remove_database(path: &Path) -> std::io::Result<()> {
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");
    let mut shm = path.as_os_str().to_owned();
    shm.push("-shm");

    for file in [path.to_path_buf(), PathBuf::from(wal), PathBuf::from(shm)] {
        match std::fs::remove_file(&file) {
            Ok(()) => info!(path = %file.display(), "Removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
