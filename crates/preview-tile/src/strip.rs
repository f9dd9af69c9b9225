use std::collections::{HashMap, HashSet};

use tracing::debug;

use player_manager::PlayerManager;

use crate::{ContentId, ContentItem, PreviewTile};

/// Owns the tiles for the currently visible slice of a feed and drives their
/// activation signals. Tiles that leave the visible set are destroyed on the
/// spot; nothing is retained off screen.
pub struct PreviewStrip {
    manager: PlayerManager,
    tiles: HashMap<ContentId, PreviewTile>,
    active: Option<ContentId>,
}

impl PreviewStrip {
    pub fn new(manager: PlayerManager) -> Self {
        Self {
            manager,
            tiles: HashMap::new(),
            active: None,
        }
    }

    /// Reconcile against the owner's scroll state: create tiles for newly
    /// visible items, destroy tiles that scrolled away, and flip activation
    /// so that at most `active` plays.
    pub fn sync(&mut self, visible: &[ContentItem], active: Option<&ContentId>) {
        let keep: HashSet<&ContentId> = visible.iter().map(|item| &item.id).collect();
        let gone: Vec<ContentId> = self
            .tiles
            .keys()
            .filter(|id| !keep.contains(id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(mut tile) = self.tiles.remove(&id) {
                tile.on_destroy();
                debug!(target = "preview", content = %id, "tile left viewport");
            }
        }

        for item in visible {
            self.tiles
                .entry(item.id.clone())
                .or_insert_with(|| PreviewTile::new(item.clone(), self.manager.clone()));
        }

        for (id, tile) in self.tiles.iter_mut() {
            tile.set_active(Some(id) == active);
        }
        self.active = active.cloned();
    }

    /// Forward one tick to every tile so pending acquisitions resolve.
    pub fn poll(&mut self) {
        for tile in self.tiles.values_mut() {
            tile.poll();
        }
    }

    pub fn active(&self) -> Option<&ContentId> {
        self.active.as_ref()
    }

    pub fn tile(&self, id: &ContentId) -> Option<&PreviewTile> {
        self.tiles.get(id)
    }

    pub fn tile_mut(&mut self, id: &ContentId) -> Option<&mut PreviewTile> {
        self.tiles.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
