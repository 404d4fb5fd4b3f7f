/// The paged outfit catalog
///
/// Builds one browsing page per clothing category from the built-in
/// wardrobe plus the persisted cutouts, and carries the selection and
/// paging operations for the today-view rows.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::Rng;

use super::data::{ClothingCategory, ClothingItem, ClothingPage, ItemImage};
use super::store::CutoutStore;

pub struct OutfitCatalog {
    pages: HashMap<ClothingCategory, ClothingPage>,
    pub weather_temperature: String,
}

impl OutfitCatalog {
    /// Assemble all category pages. Tops get the persisted cutouts
    /// prepended; a store read failure degrades to the built-ins.
    pub fn load(store: &CutoutStore) -> Self {
        let mut pages = HashMap::new();

        let hats = vec![
            ClothingItem::asset("Gray Cap", "cap_gray", ClothingCategory::Hats),
            ClothingItem::asset("Black Cap", "cap_black", ClothingCategory::Hats),
            ClothingItem::asset("Gray Cap 2", "cap_gray", ClothingCategory::Hats),
        ];
        pages.insert(ClothingCategory::Hats, ClothingPage::new(hats, 1, 2, 3));

        let mut tops = Self::load_cutouts(store);
        tops.extend([
            ClothingItem::asset("Gray T-Shirt", "tshirt_cyan", ClothingCategory::Tops),
            ClothingItem::asset("Blue T-Shirt", "tshirt_blue", ClothingCategory::Tops),
            ClothingItem::asset("Red T-Shirt", "tshirt_red", ClothingCategory::Tops),
        ]);
        let total_tops = tops.len();
        pages.insert(
            ClothingCategory::Tops,
            ClothingPage::new(tops, 0, 1, total_tops),
        );

        let bottoms = vec![
            ClothingItem::asset("Gray Jeans", "jeans_gray", ClothingCategory::Bottoms),
            ClothingItem::asset("Blue Jeans", "jeans_blue", ClothingCategory::Bottoms),
            ClothingItem::asset("Gray Jeans 2", "jeans_gray", ClothingCategory::Bottoms),
        ];
        pages.insert(ClothingCategory::Bottoms, ClothingPage::new(bottoms, 1, 2, 3));

        let shoes = vec![
            ClothingItem::asset("Gray Shoes", "shoes_gray", ClothingCategory::Shoes),
            ClothingItem::asset("Black Shoes", "shoes_black", ClothingCategory::Shoes),
            ClothingItem::asset("Gray Shoes 2", "shoes_gray", ClothingCategory::Shoes),
        ];
        pages.insert(ClothingCategory::Shoes, ClothingPage::new(shoes, 1, 2, 3));

        // Flag built-ins whose asset file is missing from disk
        let assets = available_assets(Path::new("assets"));
        for page in pages.values() {
            for item in &page.items {
                if let ItemImage::Asset(name) = &item.image {
                    if !assets.contains_key(name) {
                        log::debug!("Built-in asset '{name}' not found on disk");
                    }
                }
            }
        }

        OutfitCatalog {
            pages,
            weather_temperature: String::from("18°C"),
        }
    }

    /// Cutouts from the store mapped into owned-image tops, newest
    /// first across both tag queries.
    fn load_cutouts(store: &CutoutStore) -> Vec<ClothingItem> {
        let mut records = match store.query_by_tag("cutout") {
            Ok(records) => records,
            Err(e) => {
                log::error!("❌ Failed to load cutouts: {e}");
                return Vec::new();
            }
        };

        match store.query_by_tag("tops") {
            Ok(extra) => {
                for record in extra {
                    if !records.iter().any(|r| r.id == record.id) {
                        records.push(record);
                    }
                }
            }
            Err(e) => log::error!("❌ Failed to load tagged tops: {e}"),
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
            .into_iter()
            .map(|record| ClothingItem::owned("Saved T-Shirt", record.image, ClothingCategory::Tops))
            .collect()
    }

    pub fn page(&self, category: ClothingCategory) -> Option<&ClothingPage> {
        self.pages.get(&category)
    }

    /// Select an item. Out-of-range indexes are ignored; a selection
    /// mirrors its index into the page counter.
    pub fn select_item(&mut self, category: ClothingCategory, index: usize) {
        let Some(page) = self.pages.get_mut(&category) else {
            return;
        };
        if index >= page.items.len() {
            return;
        }
        page.selected_index = index;
        page.current_page = index + 1;
    }

    /// Advance the page counter, clamped to the page count. The item
    /// window itself does not move.
    pub fn next_page(&mut self, category: ClothingCategory) {
        let Some(page) = self.pages.get_mut(&category) else {
            return;
        };
        if page.current_page < page.total_pages {
            page.current_page += 1;
        }
    }

    /// Step the page counter back, clamped to the first page.
    pub fn previous_page(&mut self, category: ClothingCategory) {
        let Some(page) = self.pages.get_mut(&category) else {
            return;
        };
        if page.current_page > 1 {
            page.current_page -= 1;
        }
    }

    /// Jump the page counter, clamped into [1, total_pages].
    pub fn update_page(&mut self, category: ClothingCategory, page_number: usize) {
        let Some(page) = self.pages.get_mut(&category) else {
            return;
        };
        page.current_page = page_number.clamp(1, page.total_pages.max(1));
    }

    /// Randomize the selection in every category.
    pub fn swap_outfits(&mut self) {
        let mut rng = rand::rng();
        for page in self.pages.values_mut() {
            if page.items.is_empty() {
                continue;
            }
            let index = rng.random_range(0..page.items.len());
            page.selected_index = index;
            page.current_page = index + 1;
        }
        log::info!("🔀 Swapped outfit selection");
    }

    /// Log the currently selected outfit combination.
    pub fn create_outfit(&self) {
        for category in ClothingCategory::all() {
            if let Some(item) = self.page(category).and_then(ClothingPage::selected_item) {
                log::info!("👕 Outfit {}: {}", category.label(), item.name);
            }
        }
    }
}

/// Built-in clothing assets discovered on disk, keyed by file stem.
pub fn available_assets(assets_dir: &Path) -> HashMap<String, PathBuf> {
    let mut assets = HashMap::new();

    for entry in walkdir::WalkDir::new(assets_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(extension) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            continue;
        };
        if extension != "png" && extension != "jpg" && extension != "jpeg" {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            assets.insert(stem.to_string_lossy().to_string(), path.to_path_buf());
        }
    }

    assets
}
