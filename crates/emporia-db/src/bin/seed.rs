//! # Seed Data Generator
//!
//! Populates a development database with accounts, a catalog and a few
//! orders that exercise every ledger.
//!
//! ## Usage
//! ```bash
//! # Seed ./emporia_dev.db
//! cargo run -p emporia-db --bin seed
//!
//! # Specify database path (EMPORIA_DB_PATH works too)
//! cargo run -p emporia-db --bin seed -- --db ./data/emporia.db
//!
//! # More detail
//! RUST_LOG=debug cargo run -p emporia-db --bin seed
//! ```
//!
//! ## Generated Data
//! - One account per role (the wholesaler approved, with a custom price)
//! - Products across flavors and strengths
//! - A referred retail order, a wholesale order at the 250+ band,
//!   an approved loan and a delivered distributor order

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use emporia_core::cart::Cart;
use emporia_core::order::CheckoutOptions;
use emporia_core::{
    CommerceConfig, LoanStatus, Money, OrderStatus, PaymentMethod, RepaymentType, Role,
    WholesaleStatus,
};
use emporia_db::{Database, DbConfig, NewProduct, NewUser};

const FLAVORS: &[&str] = &["Mint", "Berry", "Citrus", "Coffee", "Wintergreen"];

/// Strength label and retail price in cents
const STRENGTHS: &[(&str, i64)] = &[("3mg", 449), ("6mg", 499), ("12mg", 549)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,emporia=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = env::var("EMPORIA_DB_PATH").unwrap_or_else(|_| String::from("./emporia_dev.db"));

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Emporia Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./emporia_dev.db)");
                println!("  -h, --help         Show this help message");
                println!();
                println!("Business constants are read from EMPORIA_* environment variables.");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let commerce = CommerceConfig::from_env()?;
    let db = Database::new(DbConfig::new(&db_path).commerce(commerce)).await?;
    info!(path = %db_path, "Connected, migrations applied");

    if db.products().count().await? > 0 {
        println!("⚠ Database already has products, skipping seed.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Accounts
    let admin = db.users().register(&new_user("admin@emporia.dev", "Admin", Role::Admin)).await?;
    let admin = admin.actor();

    let referrer = db.users().register(&new_user("ref@emporia.dev", "Riley Referrer", Role::Retail)).await?;
    let code = db.commissions().ensure_referral_code(referrer.id).await?;

    let buyer = db.users().register(&new_user("buyer@emporia.dev", "Blake Buyer", Role::Retail)).await?;
    db.commissions().set_referrer(buyer.id, &code).await?;

    let shop = db.users().register(&new_user("shop@emporia.dev", "Corner Shop", Role::Wholesale)).await?;
    db.users().set_wholesale_status(shop.id, WholesaleStatus::Approved, &admin).await?;
    let shop = db
        .users()
        .set_custom_price(shop.id, "Mint", "6mg", 250, Money::from_cents(700), &admin)
        .await?;

    let courier = db.users().register(&new_user("courier@emporia.dev", "Dana Distributor", Role::Distributor)).await?;
    println!("✓ Accounts created (referral code {code})");

    // Catalog
    let mut products = Vec::new();
    for flavor in FLAVORS {
        for (strength, price) in STRENGTHS {
            let product = db
                .products()
                .insert(&NewProduct {
                    name: format!("{flavor} {strength} Pouches"),
                    flavor: flavor.to_string(),
                    strength: strength.to_string(),
                    retail_price: Money::from_cents(*price),
                })
                .await?;
            products.push(product);
        }
    }
    println!("✓ {} products", products.len());

    for product in products.iter().take(3) {
        db.distributors().set_inventory(courier.id, product.id, 200, &admin).await?;
    }

    // Referred retail order, delivered by the distributor
    let mut cart = Cart::retail(db.commerce(), None);
    cart.add_item(&products[0], 10)?;
    let options = CheckoutOptions {
        referral_code: Some(code.clone()),
        ..Default::default()
    };
    let retail = db
        .orders()
        .create_order(&cart, Some(&buyer.actor()), PaymentMethod::Card, &options)
        .await?;
    db.orders().verify_payment(retail.id, &admin).await?;
    db.orders().assign_to_distributor(retail.id, courier.id, &admin).await?;
    for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
        db.orders().update_status(retail.id, status, &courier.actor()).await?;
    }
    println!("✓ Retail order #{} delivered ({})", retail.id, retail.total);

    // Wholesale order on credit at the 250+ band
    let loan = db.loans().create_loan(shop.id, Money::from_cents(500_000), &shop.actor()).await?;
    db.loans().set_status(loan.id, LoanStatus::Approved, &admin).await?;

    let mint_6mg = products
        .iter()
        .find(|p| p.flavor == "Mint" && p.strength == "6mg")
        .ok_or("Mint 6mg missing from catalog")?;
    let mut cart = Cart::wholesale(db.commerce(), shop.custom_pricing.clone());
    cart.add_item(mint_6mg, 200)?;
    cart.add_item(&products[1], 150)?;
    let options = CheckoutOptions {
        wholesale_loan_id: Some(loan.id),
        ..Default::default()
    };
    let wholesale = db
        .orders()
        .create_order(&cart, Some(&shop.actor()), PaymentMethod::Loan, &options)
        .await?;
    db.loans()
        .apply_repayment(loan.id, Money::from_cents(100_000), RepaymentType::DirectPayment, None, &shop.actor())
        .await?;
    println!("✓ Wholesale order #{} on loan #{} ({})", wholesale.id, loan.id, wholesale.total);

    let stats = db.commissions().get_stats(referrer.id).await?;
    let summary = db.commissions().get_system_summary(&admin).await?;
    println!();
    println!("Referrer {}: {} referrals, {} pending", referrer.email, stats.total_referrals, stats.pending_earnings);
    println!("System: {} pending, {} paid", summary.total_commission_pending, summary.total_commission_paid);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn new_user(email: &str, name: &str, role: Role) -> NewUser {
    NewUser {
        email: email.to_string(),
        name: name.to_string(),
        role,
    }
}
