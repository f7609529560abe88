//! Sprite atlas layout
//!
//! Sprites referenced across all units are accumulated during the first
//! resolution pass; once every unit has contributed, the atlas is laid out and
//! sprite call sites are rewritten with their coordinates.

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::warn;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// One sprite as requested by a call site. Identical keys share a placement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpriteKey {
    pub name: String,
    pub color: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub x: Option<u32>,
    pub y: Option<u32>,
}

impl SpriteKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            width: None,
            height: None,
            x: None,
            y: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpritePlacement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Finished layout handed to an [`AtlasEncoder`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtlasImage {
    pub width: u32,
    pub height: u32,
    pub sprites: Vec<(SpriteKey, SpritePlacement)>,
}

pub trait AtlasBuilder: Send {
    /// Forget the sprites of the previous cycle, keeping its layout for comparison
    fn begin_cycle(&mut self);

    fn add(&mut self, key: SpriteKey);

    /// Whether this cycle's sprite set differs from the last built layout
    fn was_changed(&self) -> bool;

    /// Lay out the current sprite set. `size_of` reports source image sizes.
    fn build(&mut self, size_of: &mut dyn FnMut(&str) -> Option<(u32, u32)>) -> AtlasImage;

    fn query(&self, key: &SpriteKey) -> Option<SpritePlacement>;
}

/// Composes and encodes the atlas pixels.
pub trait AtlasEncoder: Send + Sync {
    fn encode(
        &self,
        image: &AtlasImage,
        read: &mut dyn FnMut(&str) -> Option<Arc<[u8]>>,
    ) -> Result<Vec<u8>, String>;
}

/// Width and height from a PNG IHDR chunk
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || &bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Some((width, height))
}

/// Shelf packing atlas: sprites sorted by height are placed left to right in
/// rows no wider than the square root of the total area.
#[derive(Debug, Default)]
pub struct ShelfAtlas {
    current: IndexSet<SpriteKey>,
    built: Option<FxHashMap<SpriteKey, SpritePlacement>>,
}

impl ShelfAtlas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

impl AtlasBuilder for ShelfAtlas {
    fn begin_cycle(&mut self) {
        self.current.clear();
    }

    fn add(&mut self, key: SpriteKey) {
        self.current.insert(key);
    }

    fn was_changed(&self) -> bool {
        match &self.built {
            None => !self.current.is_empty(),
            Some(built) => {
                built.len() != self.current.len()
                    || self.current.iter().any(|key| !built.contains_key(key))
            }
        }
    }

    fn build(&mut self, size_of: &mut dyn FnMut(&str) -> Option<(u32, u32)>) -> AtlasImage {
        let mut sized: Vec<(SpriteKey, u32, u32)> = Vec::new();
        for key in &self.current {
            let Some((image_width, image_height)) = size_of(&key.name) else {
                warn!("Sprite image {} could not be read, leaving it out of the atlas", key.name);
                continue;
            };
            let width = key
                .width
                .unwrap_or_else(|| image_width.saturating_sub(key.x.unwrap_or(0)));
            let height = key
                .height
                .unwrap_or_else(|| image_height.saturating_sub(key.y.unwrap_or(0)));
            sized.push((key.clone(), width, height));
        }
        sized.sort_by(|a, b| b.2.cmp(&a.2).then(b.1.cmp(&a.1)).then(a.0.cmp(&b.0)));

        let area: u64 = sized.iter().map(|(_, w, h)| *w as u64 * *h as u64).sum();
        let widest = sized.iter().map(|(_, w, _)| *w).max().unwrap_or(0);
        let row_limit = widest.max((area as f64).sqrt().ceil() as u32);

        let mut placements = FxHashMap::default();
        let mut image = AtlasImage::default();
        let (mut cursor_x, mut shelf_y, mut shelf_height) = (0u32, 0u32, 0u32);
        for (key, width, height) in sized {
            if cursor_x > 0 && cursor_x + width > row_limit {
                shelf_y += shelf_height;
                cursor_x = 0;
                shelf_height = 0;
            }
            let placement = SpritePlacement {
                x: cursor_x,
                y: shelf_y,
                width,
                height,
            };
            cursor_x += width;
            shelf_height = shelf_height.max(height);
            image.width = image.width.max(cursor_x);
            image.height = image.height.max(shelf_y + shelf_height);
            placements.insert(key.clone(), placement);
            image.sprites.push((key, placement));
        }

        self.built = Some(placements);
        image
    }

    fn query(&self, key: &SpriteKey) -> Option<SpritePlacement> {
        self.built.as_ref()?.get(key).copied()
    }
}
