use std::collections::BTreeMap;

use ospace_store::StoreReader;
use ospace_track::ChangeTracker;
use ospace_types::{ArtifactId, Category, Edit};

use super::SaveContext;
use crate::codec;
use crate::error::{SpaceError, SpaceResult};

/// One named integer of an artifact's metadata (`length`, `count`, ...).
///
/// A differential save writes the cell only when it changed and differs
/// from the last durable value, so a push followed by a pop emits nothing.
pub(crate) struct MetaCell {
    name: &'static str,
    value: i64,
    committed: Option<i64>,
    in_flight: Option<i64>,
    tracker: ChangeTracker,
}

impl MetaCell {
    pub(crate) fn new(name: &'static str, value: i64) -> Self {
        Self {
            name,
            value,
            committed: None,
            in_flight: None,
            tracker: ChangeTracker::new(),
        }
    }

    /// Rebuild from the metadata entries read for an artifact.
    pub(crate) fn load(
        name: &'static str,
        id: &ArtifactId,
        entries: &BTreeMap<String, Vec<u8>>,
    ) -> SpaceResult<Self> {
        let category = Category::metadata(id);
        let bytes = entries
            .get(name)
            .ok_or_else(|| SpaceError::corrupt(&category, name, "missing metadata"))?;
        let value: i64 = codec::decode(bytes)
            .map_err(|e| SpaceError::corrupt(&category, name, e.to_string()))?;
        if value < 0 {
            return Err(SpaceError::corrupt(&category, name, "negative metadata value"));
        }
        Ok(Self {
            name,
            value,
            committed: Some(value),
            in_flight: None,
            tracker: ChangeTracker::loaded(),
        })
    }

    pub(crate) fn get(&self) -> i64 {
        self.value
    }

    pub(crate) fn set(&mut self, value: i64) {
        if value != self.value {
            self.value = value;
            self.tracker.mark_dirty();
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    pub(crate) fn save(&mut self, ctx: &SaveContext<'_>, out: &mut Vec<Edit>) -> SpaceResult<()> {
        let changed = self.tracker.is_dirty() && self.committed != Some(self.value);
        if !ctx.kind.is_differential() || changed {
            out.push(Edit::put(
                Category::metadata(ctx.id),
                self.name,
                codec::encode(&self.value)?,
            ));
        }
        self.in_flight = Some(self.value);
        self.tracker.save();
        Ok(())
    }

    pub(crate) fn on_saved(&mut self) {
        if let Some(value) = self.in_flight.take() {
            self.committed = Some(value);
            self.tracker.on_saved();
        }
    }

    pub(crate) fn key(&self, id: &ArtifactId) -> (Category, String) {
        (Category::metadata(id), self.name.to_string())
    }
}

/// All metadata entries stored for `id`.
pub(crate) fn read_metadata<R: StoreReader + ?Sized>(
    id: &ArtifactId,
    reader: &R,
) -> SpaceResult<BTreeMap<String, Vec<u8>>> {
    Ok(reader
        .read_category(&Category::metadata(id))?
        .into_iter()
        .collect())
}
