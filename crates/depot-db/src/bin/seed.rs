//! # Seed Data Generator
//!
//! Fills the inventory mirror with sample warehouse stock for development.
//!
//! ## Usage
//! ```bash
//! # Generate 500 products (default)
//! cargo run -p depot-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p depot-db --bin seed -- --count 2000
//!
//! # Specify database path
//! cargo run -p depot-db --bin seed -- --db ./data/depot.db
//! ```
//!
//! Each product has:
//! - SKU: `{CATEGORY}-{ITEM}-{INDEX}`
//! - Name: item plus pack size
//! - Stock: 0 - 250
//! - Location: aisle / rack / shelf, e.g. `A03-R2-S4`
//!
//! The queue is left untouched.

use std::env;

use depot_core::InventoryItem;
use depot_db::{Database, DbConfig};

/// Categories and items for realistic test data.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "HW",
        &["Hex Bolt", "Wood Screw", "Wall Anchor", "Hinge", "Padlock", "Cable Tie"],
    ),
    (
        "EL",
        &["Extension Cord", "LED Bulb", "Fuse", "Switch Plate", "Junction Box"],
    ),
    (
        "PK",
        &["Pallet Wrap", "Carton Box", "Packing Tape", "Bubble Roll", "Label Roll"],
    ),
    (
        "SF",
        &["Safety Gloves", "Hard Hat", "Hi-Vis Vest", "Ear Plugs", "Goggles"],
    ),
];

/// Pack sizes.
const SIZES: &[&str] = &["Single", "5-Pack", "10-Pack", "Case", "Pallet"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 500;
    let mut db_path = String::from("./depot_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(500);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Depot Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 500)");
                println!("  -d, --db <PATH>    Database file path (default: ./depot_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Depot Seed Data Generator");
    println!("=========================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.mirror().count().await?;
    if existing > 0 {
        println!("⚠ Mirror already has {} products", existing);
        println!("  Skipping seed to avoid overwriting them.");
        return Ok(());
    }

    let items = generate_items(count);
    let start = std::time::Instant::now();
    let rows = db.mirror().replace_all(&items).await?;

    println!("✓ Seeded {} products in {:?}", rows, start.elapsed());

    let device_id = db.meta().device_id().await?;
    println!("  Device id: {}", device_id);

    db.close().await;
    Ok(())
}

/// Generates up to `count` deterministic products.
fn generate_items(count: usize) -> Vec<InventoryItem> {
    let mut items = Vec::with_capacity(count);
    let mut seed = 0usize;

    'outer: for (category, names) in CATEGORIES {
        for name in names.iter() {
            for size in SIZES {
                if items.len() >= count {
                    break 'outer;
                }
                items.push(generate_item(category, name, size, seed));
                seed += 1;
            }
        }
    }

    // Past the named catalogue, repeat it with higher indices.
    while items.len() < count {
        let (category, names) = CATEGORIES[seed % CATEGORIES.len()];
        let name = names[seed % names.len()];
        let size = SIZES[seed % SIZES.len()];
        items.push(generate_item(category, name, size, seed));
        seed += 1;
    }

    items
}

fn generate_item(category: &str, name: &str, size: &str, seed: usize) -> InventoryItem {
    let code: String = name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .collect::<String>()
        .to_uppercase();

    InventoryItem {
        sku: format!("{}-{}-{:04}", category, code, seed),
        name: format!("{} {}", name, size),
        stock: ((seed * 37) % 251) as i64,
        location: Some(format!(
            "A{:02}-R{}-S{}",
            seed % 24 + 1,
            seed % 6 + 1,
            seed % 5 + 1
        )),
    }
}
