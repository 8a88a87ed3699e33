//! Persistence backends for the repository interfaces in [`crate::domain::repos`].

pub mod db;
pub mod memory;
pub mod postgres;

use anyhow::Result;
use tracing::info;

use crate::domain::repos::CategoryRepo;

/// The fixed category set. Created once if absent; never deleted by the
/// pipeline.
pub const DEFAULT_CATEGORIES: [(&str, &str); 6] = [
    ("Portátiles", "portatiles"),
    ("Tarjetas Gráficas", "tarjetas-graficas"),
    ("Auriculares", "auriculares"),
    ("Teclados", "teclados"),
    ("Monitores", "monitores"),
    ("Discos SSD", "ssd"),
];

/// Create any of the default categories that do not exist yet.
pub async fn seed_categories(repo: &dyn CategoryRepo) -> Result<()> {
    for (name, slug) in DEFAULT_CATEGORIES {
        if repo.find_by_slug(slug).await?.is_none() {
            let created = repo.create(name, slug).await?;
            info!(category = %created.name, id = created.id, "category created");
        }
    }
    Ok(())
}
