/// Shared data structures for the outfit catalog
///
/// These values are transient: they are rebuilt from built-in assets
/// and the cutout store every time the catalog loads, and are never
/// persisted directly.
use image::RgbaImage;

/// Wardrobe categories, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClothingCategory {
    Hats,
    Tops,
    Bottoms,
    Shoes,
}

impl ClothingCategory {
    pub fn all() -> [ClothingCategory; 4] {
        [
            ClothingCategory::Hats,
            ClothingCategory::Tops,
            ClothingCategory::Bottoms,
            ClothingCategory::Shoes,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClothingCategory::Hats => "Hats",
            ClothingCategory::Tops => "Tops",
            ClothingCategory::Bottoms => "Bottoms",
            ClothingCategory::Shoes => "Shoes",
        }
    }

    /// Row height for this category, as a fraction of the window
    /// height. Hats and shoes render smaller than tops and bottoms.
    pub fn preferred_height(&self, window_height: f32) -> f32 {
        match self {
            ClothingCategory::Hats | ClothingCategory::Shoes => window_height / 12.0,
            ClothingCategory::Tops | ClothingCategory::Bottoms => window_height / 6.0,
        }
    }
}

/// Where an item's picture comes from: a named built-in asset, or a
/// bitmap owned by the item (cutouts loaded from the store).
#[derive(Clone)]
pub enum ItemImage {
    Asset(String),
    Owned(RgbaImage),
}

/// One wardrobe entry. Immutable once constructed.
#[derive(Clone)]
pub struct ClothingItem {
    pub name: String,
    pub image: ItemImage,
    pub category: ClothingCategory,
}

impl ClothingItem {
    pub fn asset(name: &str, asset_name: &str, category: ClothingCategory) -> Self {
        ClothingItem {
            name: name.to_string(),
            image: ItemImage::Asset(asset_name.to_string()),
            category,
        }
    }

    pub fn owned(name: &str, image: RgbaImage, category: ClothingCategory) -> Self {
        ClothingItem {
            name: name.to_string(),
            image: ItemImage::Owned(image),
            category,
        }
    }
}

/// A category's current browsing window.
#[derive(Clone)]
pub struct ClothingPage {
    pub items: Vec<ClothingItem>,
    pub selected_index: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

impl ClothingPage {
    pub fn new(
        items: Vec<ClothingItem>,
        selected_index: usize,
        current_page: usize,
        total_pages: usize,
    ) -> Self {
        ClothingPage {
            items,
            selected_index,
            current_page,
            total_pages,
        }
    }

    pub fn selected_item(&self) -> Option<&ClothingItem> {
        self.items.get(self.selected_index)
    }
}
