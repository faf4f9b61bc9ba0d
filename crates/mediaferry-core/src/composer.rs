//! Composer session: the one state container behind a composer page.
//!
//! Every completion (generation result, file read, library pick, return
//! from the editor) is applied through `&mut ComposerSession` and reads
//! the collection as it is at apply time. Nothing captures a copy of the
//! state to write back later.
//!
//! The session owns no storage. Callers pass in the staging desk, the
//! resume ledger and the durable store so the same session logic runs
//! against browser storage or in-memory stores.

use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::collection::{CollectionError, MAX_ITEMS, MediaCollection};
use crate::generation::GenerationOutput;
use crate::handoff::{HandoffDesk, HandoffError, TicketId};
use crate::library::{LibraryError, SharedLibrary};
use crate::ratio::{self, CropAxis, Platform};
use crate::reframe;
use crate::resume::{ResumeLedger, ResumeLookup, ResumeRecord};
use crate::snapshot::{
    self, FieldValue, PersistOutcome, SnapshotLimits, Snapshottable, WorkflowSnapshot,
};
use crate::store::KeyValueStore;
use crate::types::{INLINE_DATA_MARKER, MediaAsset, Origin};

/// Storage key prefix for autosaved snapshots; the module id follows.
pub const SNAPSHOT_KEY_PREFIX: &str = "mediaferry.composer.";

/// Errors from starting an edit round trip.
#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
    /// No image is displayed, so there is nothing to hand off.
    #[error("no image is selected for editing")]
    NothingToEdit,

    /// The image could not be staged for the editor.
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

/// Everything a composer page shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerState {
    /// Subject the generator writes about.
    pub topic: String,
    /// Voice of the generated text (e.g. "playful").
    pub tone: String,
    /// Requested output quality.
    pub quality: String,
    /// Comma-separated keywords passed to the generator.
    pub keywords: String,
    /// Whether the advanced options panel is open.
    pub advanced_open: bool,
    /// Caption text shown under the image.
    pub caption: String,
    /// Destination whose ratio library picks are framed for.
    pub platform: Platform,
    /// Generated, uploaded and library images.
    pub media: MediaCollection,
    carried: Option<CarriedDisplay>,
}

/// Display fields of a restored snapshot that a rebuilt collection cannot
/// hold. Re-emitted on capture for as long as the collection is exactly
/// what the restore left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CarriedDisplay {
    cursor: i64,
    image_origin: Option<String>,
    /// Remote image re-added to the empty collection.
    restored_image: Option<String>,
    /// The saved image was left out of the snapshot (inline or too large).
    image_excluded: bool,
}

impl CarriedDisplay {
    fn matches(&self, media: &MediaCollection) -> bool {
        match &self.restored_image {
            Some(image) => {
                media.len() == 1
                    && media.current().is_some_and(|a| a.image_ref() == image.as_str())
            }
            None => media.is_empty(),
        }
    }

    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        let mut fields: Vec<(&'static str, FieldValue)> = vec![("cursor", self.cursor.into())];
        if let Some(origin) = &self.image_origin {
            fields.push(("image_origin", origin.as_str().into()));
        }
        match &self.restored_image {
            Some(image) => fields.push(("image", image.as_str().into())),
            // Stands in for the image that was never stored, so it is
            // listed as excluded again.
            None if self.image_excluded => fields.push(("image", INLINE_DATA_MARKER.into())),
            None => {}
        }
        fields
    }
}

impl Default for ComposerState {
    fn default() -> Self {
        Self {
            topic: String::new(),
            tone: String::new(),
            quality: String::new(),
            keywords: String::new(),
            advanced_open: false,
            caption: String::new(),
            platform: Platform::InstagramFeed,
            media: MediaCollection::new(),
            carried: None,
        }
    }
}

impl Snapshottable for ComposerState {
    fn snapshot_fields(&self) -> Vec<(&'static str, FieldValue)> {
        let mut fields: Vec<(&'static str, FieldValue)> = vec![
            ("topic", self.topic.as_str().into()),
            ("tone", self.tone.as_str().into()),
            ("quality", self.quality.as_str().into()),
            ("keywords", self.keywords.as_str().into()),
            ("advanced_open", self.advanced_open.into()),
            ("caption", self.caption.as_str().into()),
            ("platform", self.platform.id().into()),
        ];
        if let Some(carried) = self.carried.as_ref().filter(|c| c.matches(&self.media)) {
            fields.extend(carried.fields());
            return fields;
        }
        if let Some(cursor) = self.media.cursor() {
            fields.push(("cursor", i64::try_from(cursor).unwrap_or(i64::MAX).into()));
        }
        // Inline images are filtered out by the snapshot; remote URLs survive.
        if let Some(current) = self.media.current() {
            fields.push(("image", current.image_ref().into()));
            fields.push(("image_origin", current.origin().label().into()));
        }
        fields
    }

    fn restore_fields(&mut self, snapshot: &WorkflowSnapshot) {
        for (name, slot) in [
            ("topic", &mut self.topic),
            ("tone", &mut self.tone),
            ("quality", &mut self.quality),
            ("keywords", &mut self.keywords),
            ("caption", &mut self.caption),
        ] {
            if let Some(text) = snapshot.text(name) {
                text.clone_into(slot);
            }
        }
        if let Some(open) = snapshot.flag("advanced_open") {
            self.advanced_open = open;
        }
        if let Some(platform) = snapshot.text("platform").and_then(Platform::from_id) {
            self.platform = platform;
        }
        if !self.media.is_empty() {
            if let Some(cursor) = snapshot.integer("cursor").and_then(|c| usize::try_from(c).ok())
                && self.media.set_cursor(cursor).is_err()
            {
                tracing::debug!(cursor, "saved cursor points past the current images");
            }
            return;
        }

        let image_origin = snapshot.text("image_origin");
        let mut restored_image = None;
        if let Some(image) = snapshot.text("image") {
            let origin = image_origin
                .and_then(Origin::from_label)
                .unwrap_or(Origin::Generated);
            let asset = MediaAsset::new(image, reframe::measure_ref(image), origin);
            match self.media.append(asset) {
                Ok(_) => restored_image = Some(image.to_owned()),
                Err(err) => tracing::warn!("could not restore displayed image: {err}"),
            }
        }
        // A rebuilt collection holds at most the displayed image, so the
        // saved cursor is kept as is rather than re-derived from it.
        self.carried = snapshot.integer("cursor").map(|cursor| CarriedDisplay {
            cursor,
            image_origin: image_origin.map(str::to_owned),
            restored_image,
            image_excluded: snapshot.excluded().contains("image"),
        });
    }
}

/// What happened to a library pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picked {
    /// Index of the appended asset.
    pub index: usize,
    /// Axis trimmed to fit the platform, [`CropAxis::None`] if untouched.
    pub crop_axis: CropAxis,
    /// Advice for the user when the image misses the ratio but could not
    /// be re-framed here (e.g. a remote URL with known dimensions).
    pub suggestion: Option<String>,
}

/// Where an edited image landed on return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Replaced the image at this index.
    Substituted(usize),
    /// Added as a new image at this index.
    Appended(usize),
}

/// Outcome of [`ComposerSession::reconcile_return`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnReport {
    /// Whether light fields were restored from the resume record.
    pub restored_fields: bool,
    /// Where the returned image went, if one came back.
    pub placement: Option<Placement>,
}

/// A composer page's state plus its module identity.
#[derive(Debug, Clone)]
pub struct ComposerSession {
    module_id: String,
    state: ComposerState,
    limits: SnapshotLimits,
}

impl ComposerSession {
    /// A fresh session for `module_id` (e.g. `"social-composer"`).
    #[must_use]
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            state: ComposerState::default(),
            limits: SnapshotLimits::default(),
        }
    }

    /// Use `limits` for snapshots instead of the defaults.
    #[must_use]
    pub const fn with_limits(mut self, limits: SnapshotLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Id this session stages, saves and receives under.
    #[must_use]
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// What the page currently shows.
    #[must_use]
    pub const fn state(&self) -> &ComposerState {
        &self.state
    }

    /// Direct access for form edits.
    pub const fn state_mut(&mut self) -> &mut ComposerState {
        &mut self.state
    }

    /// Durable-store key of this module's autosaved snapshot.
    #[must_use]
    pub fn snapshot_key(&self) -> String {
        format!("{SNAPSHOT_KEY_PREFIX}{}", self.module_id)
    }

    /// Light snapshot of the current state.
    #[must_use]
    pub fn capture(&self) -> WorkflowSnapshot {
        WorkflowSnapshot::capture(&self.state, &self.limits)
    }

    /// Apply a generation result: take its caption, and merge its image
    /// ahead of any staged material.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CapacityExceeded`] when uploads and
    /// library picks already fill the collection. The caption is still
    /// updated.
    pub fn apply_generation(&mut self, output: &GenerationOutput) -> Result<(), CollectionError> {
        if let Some(caption) = output.caption() {
            caption.clone_into(&mut self.state.caption);
        }
        if let Some(image) = output.image_ref() {
            let asset = MediaAsset::new(image, reframe::measure_ref(image), Origin::Generated);
            self.state.media.merge_generated(asset)?;
        }
        Ok(())
    }

    /// Add a user upload at the end of the collection.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CapacityExceeded`] when full.
    pub fn upload(&mut self, image_ref: &str) -> Result<usize, CollectionError> {
        let asset = MediaAsset::new(image_ref, reframe::measure_ref(image_ref), Origin::Uploaded);
        self.state.media.append(asset)
    }

    /// Add a library asset, re-framed for the current platform when it is
    /// an inline image that misses the ratio.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CapacityExceeded`] when full; nothing is
    /// decoded in that case.
    pub fn pick_from_library(&mut self, asset: &MediaAsset) -> Result<Picked, CollectionError> {
        if self.state.media.is_full() {
            return Err(CollectionError::CapacityExceeded { max: MAX_ITEMS });
        }
        let platform = self.state.platform;
        let profile = platform.profile();
        let reframed = reframe::reframe_ref(asset.image_ref(), &profile);
        let dimensions = if reframed.dimensions.is_measured() {
            reframed.dimensions
        } else {
            asset.dimensions()
        };
        let suggestion = ratio::evaluate(dimensions.width, dimensions.height, &profile)
            .suggestion(platform.label());
        if let Some(advice) = &suggestion {
            tracing::info!(platform = platform.id(), "{advice}");
        }

        let index = self.state.media.append(MediaAsset::new(
            reframed.image_ref,
            dimensions,
            Origin::Gallery,
        ))?;
        Ok(Picked {
            index,
            crop_axis: reframed.crop_axis,
            suggestion,
        })
    }

    /// Display the image at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfRange`] for a bad index.
    pub fn select(&mut self, index: usize) -> Result<(), CollectionError> {
        self.state.media.set_cursor(index)
    }

    /// Delete the image at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfRange`] for a bad index.
    pub fn remove(&mut self, index: usize) -> Result<MediaAsset, CollectionError> {
        self.state.media.remove_at(index)
    }

    /// Add the displayed image to the shared library, tagged with the
    /// topic and platform. Returns `None` when nothing is displayed.
    ///
    /// # Errors
    ///
    /// Propagates the library's refusal.
    pub fn save_to_library(
        &self,
        library: &mut impl SharedLibrary,
    ) -> Result<Option<MediaAsset>, LibraryError> {
        let Some(current) = self.state.media.current() else {
            return Ok(None);
        };
        let metadata = BTreeMap::from([
            ("topic".to_owned(), self.state.topic.clone()),
            ("platform".to_owned(), self.state.platform.id().to_owned()),
            ("source".to_owned(), self.module_id.clone()),
        ]);
        library.add_from_ref(current.image_ref(), &metadata).map(Some)
    }

    /// Hand the displayed image to `dest` for editing.
    ///
    /// Stages a ticket addressed to `dest` and saves a resume record
    /// keyed by this module, so the composer can be rebuilt and the
    /// edited image put back at the same index on return.
    ///
    /// # Errors
    ///
    /// Returns [`ComposerError::NothingToEdit`] when no image is displayed
    /// and [`ComposerError::Handoff`] when staging fails.
    pub fn begin_edit<S, C, D, K>(
        &self,
        desk: &mut HandoffDesk<S, C>,
        ledger: &mut ResumeLedger<D, K>,
        dest: &str,
    ) -> Result<TicketId, ComposerError>
    where
        S: KeyValueStore,
        C: Clock,
        D: KeyValueStore,
        K: Clock,
    {
        let (Some(index), Some(current)) = (self.state.media.cursor(), self.state.media.current())
        else {
            return Err(ComposerError::NothingToEdit);
        };
        let metadata = BTreeMap::from([
            ("topic".to_owned(), self.state.topic.clone()),
            ("tone".to_owned(), self.state.tone.clone()),
            ("platform".to_owned(), self.state.platform.id().to_owned()),
            ("editing_index".to_owned(), index.to_string()),
        ]);
        let ticket = desk.stage(current.image_ref(), &self.module_id, dest, metadata)?;
        if !ledger.save(&self.module_id, dest, self.capture(), Some(index)) {
            tracing::warn!(
                module = %self.module_id,
                "resume record missing; the edited image will be added as new"
            );
        }
        tracing::info!(module = %self.module_id, dest, index, "handed image off for editing");
        Ok(ticket)
    }

    /// Pick up the result of an edit round trip.
    ///
    /// A live resume record restores the light fields when the session
    /// was rebuilt (its collection is empty) and identifies the image that
    /// was being edited. The edited image addressed to this module then
    /// replaces that image wherever it now sits. Without a live record, or
    /// when that image is gone, the edited image is appended as a new
    /// upload and displayed.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CapacityExceeded`] when the edited image
    /// has to be appended to a full collection. The ticket and the resume
    /// record are left in place so the return can be retried once an
    /// image has been removed.
    pub fn reconcile_return<S, C, D, K>(
        &mut self,
        desk: &mut HandoffDesk<S, C>,
        ledger: &mut ResumeLedger<D, K>,
    ) -> Result<ReturnReport, CollectionError>
    where
        S: KeyValueStore,
        C: Clock,
        D: KeyValueStore,
        K: Clock,
    {
        let mut report = ReturnReport::default();
        let record = match ledger.take(&self.module_id) {
            ResumeLookup::Valid(record) => {
                if self.state.media.is_empty() {
                    self.state.restore_fields(&record.snapshot);
                    report.restored_fields = true;
                }
                Some(record)
            }
            ResumeLookup::Expired => {
                tracing::info!(module = %self.module_id, "resume record expired");
                None
            }
            ResumeLookup::Absent => None,
        };
        let target = record.as_ref().and_then(|r| self.edit_target(r));

        if target.is_none() && self.state.media.is_full() && desk.peek(&self.module_id).is_some() {
            if let Some(record) = &record
                && !ledger.put_back(record)
            {
                tracing::warn!(module = %self.module_id, "resume record lost while full");
            }
            tracing::warn!(module = %self.module_id, "edited image waiting for a free slot");
            return Err(CollectionError::CapacityExceeded { max: MAX_ITEMS });
        }

        let Some(payload) = desk.consume(&self.module_id) else {
            return Ok(report);
        };
        let dimensions = reframe::measure_ref(&payload.image_ref);
        let substitution = target.and_then(|index| {
            self.state
                .media
                .get(index)
                .map(|old| (index, old.with_ref(payload.image_ref.as_str(), dimensions)))
        });
        let placement = match substitution {
            Some((index, edited)) => {
                self.state.media.replace_at(index, edited)?;
                Placement::Substituted(index)
            }
            None => {
                let asset = MediaAsset::new(payload.image_ref, dimensions, Origin::Uploaded);
                let index = self.state.media.append(asset)?;
                self.state.media.set_cursor(index)?;
                Placement::Appended(index)
            }
        };
        tracing::info!(
            module = %self.module_id,
            from = %payload.source_module,
            ?placement,
            "edited image returned"
        );
        report.placement = Some(placement);
        Ok(report)
    }

    /// Where the image named by `record` sits in the collection now.
    ///
    /// The saved image reference wins over the saved index, which goes
    /// stale once the collection is rebuilt or reordered. Inline images
    /// are never saved, so for those the index is all there is.
    fn edit_target(&self, record: &ResumeRecord) -> Option<usize> {
        let media = &self.state.media;
        let Some(original) = record.snapshot.text("image") else {
            return record.editing_index.filter(|&index| index < media.len());
        };
        record
            .editing_index
            .filter(|&index| media.get(index).is_some_and(|a| a.image_ref() == original))
            .or_else(|| media.iter().position(|a| a.image_ref() == original))
    }

    /// Persist the light snapshot of the current state.
    pub fn autosave(&self, durable: &mut impl KeyValueStore) -> PersistOutcome {
        snapshot::persist(durable, &self.snapshot_key(), &self.capture(), &self.limits)
    }

    /// Apply the autosaved snapshot, if a readable one exists.
    ///
    /// Returns whether anything was restored.
    pub fn restore(&mut self, durable: &mut impl KeyValueStore) -> bool {
        match snapshot::restore(durable, &self.snapshot_key(), &self.limits) {
            Some(saved) => {
                self.state.restore_fields(&saved);
                true
            }
            None => false,
        }
    }

    /// Reset the page and delete its autosaved snapshot. The platform
    /// choice is kept.
    pub fn clear_working_state(&mut self, durable: &mut impl KeyValueStore) {
        self.state = ComposerState {
            platform: self.state.platform,
            ..ComposerState::default()
        };
        snapshot::clear(durable, &self.snapshot_key());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::generation::{GenerationKind, parse_generation};
    use crate::handoff::TICKET_TTL_SECS;
    use crate::library::InMemoryLibrary;
    use crate::reframe::encode_data_uri;
    use crate::store::MemoryStore;
    use crate::types::Dimensions;

    const SOCIAL: &str = "social-composer";
    const STUDIO: &str = "design-studio";

    fn png_uri(width: u32, height: u32) -> String {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 120, 200, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        encode_data_uri("image/png", &out.into_inner())
    }

    fn generated(image: &str) -> GenerationOutput {
        GenerationOutput::Image {
            image_ref: image.to_owned(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn generation_goes_first_and_keeps_uploads() {
        let mut session = ComposerSession::new(SOCIAL);
        session.upload("https://cdn/u1.png").unwrap();
        session.upload("https://cdn/u2.png").unwrap();
        session.select(1).unwrap();

        let out = parse_generation(
            GenerationKind::SocialPost,
            r#"{"caption":"New season","image_url":"https://cdn/g1.png"}"#,
        )
        .unwrap();
        session.apply_generation(&out).unwrap();

        let media = &session.state().media;
        assert_eq!(media.len(), 3);
        assert_eq!(media.cursor(), Some(0));
        assert_eq!(media.get(0).unwrap().origin(), Origin::Generated);
        assert_eq!(session.state().caption, "New season");

        session.apply_generation(&generated("https://cdn/g2.png")).unwrap();
        let refs: Vec<_> = session.state().media.iter().map(MediaAsset::image_ref).collect();
        assert_eq!(refs, ["https://cdn/g2.png", "https://cdn/u1.png", "https://cdn/u2.png"]);
    }

    #[test]
    fn uploads_are_measured_when_inline() {
        let mut session = ComposerSession::new(SOCIAL);
        let index = session.upload(&png_uri(30, 20)).unwrap();
        assert_eq!(
            session.state().media.get(index).unwrap().dimensions(),
            Dimensions::new(30, 20)
        );
    }

    #[test]
    fn library_pick_is_reframed_for_platform() {
        let mut session = ComposerSession::new(SOCIAL);
        let asset = MediaAsset::unmeasured(png_uri(160, 90), Origin::Gallery);
        let picked = session.pick_from_library(&asset).unwrap();

        assert_eq!(picked.crop_axis, CropAxis::Horizontal);
        assert_eq!(picked.suggestion, None);
        let stored = session.state().media.get(picked.index).unwrap();
        assert_eq!(stored.dimensions(), Dimensions::new(90, 90));
        assert_eq!(stored.origin(), Origin::Gallery);
    }

    #[test]
    fn remote_library_pick_gets_a_suggestion() {
        let mut session = ComposerSession::new(SOCIAL);
        session.state_mut().platform = Platform::Pinterest;
        let asset = MediaAsset::new(
            "https://cdn/wide.jpg",
            Dimensions::new(1600, 900),
            Origin::Gallery,
        );
        let picked = session.pick_from_library(&asset).unwrap();
        assert_eq!(picked.crop_axis, CropAxis::None);
        let advice = picked.suggestion.unwrap();
        assert!(advice.contains("Pinterest"), "{advice}");
        assert!(advice.contains("left/right"), "{advice}");
    }

    #[test]
    fn full_collection_rejects_picks_and_uploads() {
        let mut session = ComposerSession::new(SOCIAL);
        for i in 0..MAX_ITEMS {
            session.upload(&format!("https://cdn/{i}.png")).unwrap();
        }
        let asset = MediaAsset::unmeasured("https://cdn/extra.png", Origin::Gallery);
        assert_eq!(
            session.pick_from_library(&asset),
            Err(CollectionError::CapacityExceeded { max: MAX_ITEMS })
        );
        assert!(session.upload("https://cdn/extra.png").is_err());
        assert!(session.apply_generation(&generated("https://cdn/g.png")).is_err());
        assert_eq!(session.state().media.len(), MAX_ITEMS);
    }

    #[test]
    fn save_to_library_tags_current_image() {
        let mut session = ComposerSession::new(SOCIAL);
        session.state_mut().topic = "bakery".into();
        let mut library = InMemoryLibrary::new();
        assert_eq!(session.save_to_library(&mut library).unwrap(), None);

        session.upload("https://cdn/bread.png").unwrap();
        session.save_to_library(&mut library).unwrap().unwrap();
        let meta = library.metadata("https://cdn/bread.png").unwrap();
        assert_eq!(meta["topic"], "bakery");
        assert_eq!(meta["source"], SOCIAL);
    }

    #[test]
    fn begin_edit_needs_an_image() {
        let clock = ManualClock::at(0);
        let session = ComposerSession::new(SOCIAL);
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        assert!(matches!(
            session.begin_edit(&mut desk, &mut ledger, STUDIO),
            Err(ComposerError::NothingToEdit)
        ));
    }

    #[test]
    fn edited_image_replaces_original_in_live_session() {
        let clock = ManualClock::at(1_000);
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        let mut session = ComposerSession::new(SOCIAL);
        for name in ["a", "b", "c"] {
            session.upload(&format!("https://cdn/{name}.png")).unwrap();
        }
        session.select(1).unwrap();
        session.begin_edit(&mut desk, &mut ledger, STUDIO).unwrap();

        // The editor consumes its ticket and sends the result back.
        let handed = desk.consume(STUDIO).unwrap();
        assert_eq!(handed.image_ref, "https://cdn/b.png");
        assert_eq!(handed.metadata["editing_index"], "1");
        clock.advance(Duration::from_secs(120));
        desk.stage("https://cdn/b-edited.png", STUDIO, SOCIAL, BTreeMap::new())
            .unwrap();

        session.select(2).unwrap();
        let report = session.reconcile_return(&mut desk, &mut ledger).unwrap();
        assert_eq!(report.placement, Some(Placement::Substituted(1)));
        assert!(!report.restored_fields);
        let media = &session.state().media;
        assert_eq!(media.get(1).unwrap().image_ref(), "https://cdn/b-edited.png");
        assert_eq!(media.get(1).unwrap().origin(), Origin::Uploaded);
        assert_eq!(media.cursor(), Some(2));
    }

    #[test]
    fn expired_record_appends_returning_image() {
        let clock = ManualClock::at(0);
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        let mut session = ComposerSession::new(SOCIAL);
        session.upload("https://cdn/a.png").unwrap();
        session.begin_edit(&mut desk, &mut ledger, STUDIO).unwrap();
        desk.consume(STUDIO).unwrap();

        clock.advance(Duration::from_secs(TICKET_TTL_SECS + 1));
        desk.stage("https://cdn/a-edited.png", STUDIO, SOCIAL, BTreeMap::new())
            .unwrap();
        let report = session.reconcile_return(&mut desk, &mut ledger).unwrap();
        assert_eq!(report.placement, Some(Placement::Appended(1)));
        assert_eq!(session.state().media.get(0).unwrap().image_ref(), "https://cdn/a.png");
        assert_eq!(session.state().media.cursor(), Some(1));
    }

    #[test]
    fn rebuilt_session_restores_fields_and_appends_inline_edit() {
        let clock = ManualClock::at(0);
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);

        let mut original = ComposerSession::new(SOCIAL);
        original.state_mut().topic = "coffee".into();
        original.state_mut().platform = Platform::TikTok;
        original.state_mut().advanced_open = true;
        original.upload(&png_uri(8, 8)).unwrap();
        original.begin_edit(&mut desk, &mut ledger, STUDIO).unwrap();
        desk.consume(STUDIO).unwrap();
        desk.stage(&png_uri(9, 16), STUDIO, SOCIAL, BTreeMap::new())
            .unwrap();

        // Full reload: only the light fields come back.
        let mut rebuilt = ComposerSession::new(SOCIAL);
        let report = rebuilt.reconcile_return(&mut desk, &mut ledger).unwrap();
        assert!(report.restored_fields);
        assert_eq!(report.placement, Some(Placement::Appended(0)));
        assert_eq!(rebuilt.state().topic, "coffee");
        assert_eq!(rebuilt.state().platform, Platform::TikTok);
        assert!(rebuilt.state().advanced_open);
        assert_eq!(
            rebuilt.state().media.current().unwrap().dimensions(),
            Dimensions::new(9, 16)
        );
    }

    #[test]
    fn rebuilt_session_substitutes_remote_image() {
        let clock = ManualClock::at(0);
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);

        let mut original = ComposerSession::new(SOCIAL);
        original.apply_generation(&generated("https://cdn/g.png")).unwrap();
        original.begin_edit(&mut desk, &mut ledger, STUDIO).unwrap();
        desk.consume(STUDIO).unwrap();
        desk.stage("https://cdn/g-edited.png", STUDIO, SOCIAL, BTreeMap::new())
            .unwrap();

        let mut rebuilt = ComposerSession::new(SOCIAL);
        let report = rebuilt.reconcile_return(&mut desk, &mut ledger).unwrap();
        assert_eq!(report.placement, Some(Placement::Substituted(0)));
        let current = rebuilt.state().media.current().unwrap();
        assert_eq!(current.image_ref(), "https://cdn/g-edited.png");
        assert_eq!(current.origin(), Origin::Generated);
    }

    #[test]
    fn edited_image_follows_original_after_removal() {
        let clock = ManualClock::at(0);
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        let mut session = ComposerSession::new(SOCIAL);
        for name in ["a", "b", "c"] {
            session.upload(&format!("https://cdn/{name}.png")).unwrap();
        }
        session.select(2).unwrap();
        session.begin_edit(&mut desk, &mut ledger, STUDIO).unwrap();
        desk.consume(STUDIO).unwrap();
        desk.stage("https://cdn/c-edited.png", STUDIO, SOCIAL, BTreeMap::new())
            .unwrap();

        session.remove(0).unwrap();
        let report = session.reconcile_return(&mut desk, &mut ledger).unwrap();
        assert_eq!(report.placement, Some(Placement::Substituted(1)));
        let refs: Vec<_> = session.state().media.iter().map(MediaAsset::image_ref).collect();
        assert_eq!(refs, ["https://cdn/b.png", "https://cdn/c-edited.png"]);
    }

    #[test]
    fn full_collection_leaves_returning_image_staged() {
        let clock = ManualClock::at(0);
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        let mut session = ComposerSession::new(SOCIAL);
        for i in 0..MAX_ITEMS {
            session.upload(&format!("https://cdn/{i}.png")).unwrap();
        }
        session.select(4).unwrap();
        session.begin_edit(&mut desk, &mut ledger, STUDIO).unwrap();
        desk.consume(STUDIO).unwrap();

        // The original is deleted and its slot refilled while the editor works.
        session.remove(4).unwrap();
        session.upload("https://cdn/late.png").unwrap();
        desk.stage("https://cdn/4-edited.png", STUDIO, SOCIAL, BTreeMap::new())
            .unwrap();

        assert_eq!(
            session.reconcile_return(&mut desk, &mut ledger),
            Err(CollectionError::CapacityExceeded { max: MAX_ITEMS })
        );
        assert_eq!(desk.peek(SOCIAL).unwrap().image_ref, "https://cdn/4-edited.png");
        assert!(ledger.has_record(SOCIAL));
        assert_eq!(session.state().media.len(), MAX_ITEMS);

        session.remove(0).unwrap();
        let report = session.reconcile_return(&mut desk, &mut ledger).unwrap();
        assert_eq!(report.placement, Some(Placement::Appended(MAX_ITEMS - 1)));
        assert_eq!(
            session.state().media.current().unwrap().image_ref(),
            "https://cdn/4-edited.png"
        );
        assert!(desk.peek(SOCIAL).is_none());
        assert!(!ledger.has_record(SOCIAL));
    }

    #[test]
    fn restored_page_substitutes_displayed_image() {
        let clock = ManualClock::at(0);
        let mut durable = MemoryStore::new();
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);

        let mut original = ComposerSession::new(SOCIAL);
        for name in ["a", "b", "c"] {
            original.upload(&format!("https://cdn/{name}.png")).unwrap();
        }
        original.select(2).unwrap();
        original.autosave(&mut durable);
        {
            let mut ledger = ResumeLedger::new(&mut durable, &clock);
            original.begin_edit(&mut desk, &mut ledger, STUDIO).unwrap();
        }
        desk.consume(STUDIO).unwrap();
        desk.stage("https://cdn/c-edited.png", STUDIO, SOCIAL, BTreeMap::new())
            .unwrap();

        let mut reloaded = ComposerSession::new(SOCIAL);
        assert!(reloaded.restore(&mut durable));
        let mut ledger = ResumeLedger::new(&mut durable, &clock);
        let report = reloaded.reconcile_return(&mut desk, &mut ledger).unwrap();
        assert!(!report.restored_fields);
        assert_eq!(report.placement, Some(Placement::Substituted(0)));
        let refs: Vec<_> = reloaded.state().media.iter().map(MediaAsset::image_ref).collect();
        assert_eq!(refs, ["https://cdn/c-edited.png"]);
    }

    #[test]
    fn restore_then_autosave_leaves_snapshot_unchanged() {
        for displayed in ["https://cdn/c.png".to_owned(), png_uri(6, 6)] {
            let mut durable = MemoryStore::new();
            let mut page = ComposerSession::new(SOCIAL);
            page.state_mut().topic = "harbour".into();
            page.upload("https://cdn/a.png").unwrap();
            page.upload("https://cdn/b.png").unwrap();
            page.upload(&displayed).unwrap();
            page.select(2).unwrap();
            assert_eq!(page.autosave(&mut durable), PersistOutcome::Written);
            let saved = durable.get(&page.snapshot_key()).unwrap();

            let mut reloaded = ComposerSession::new(SOCIAL);
            assert!(reloaded.restore(&mut durable));
            assert_eq!(reloaded.capture(), page.capture());
            assert_eq!(reloaded.autosave(&mut durable), PersistOutcome::Unchanged);
            assert_eq!(durable.get(&page.snapshot_key()).unwrap(), saved);

            // Real changes to the collection are saved as they are.
            reloaded.upload("https://cdn/d.png").unwrap();
            assert_ne!(reloaded.capture().integer("cursor"), Some(2));
        }
    }

    #[test]
    fn direct_navigation_without_ticket_changes_nothing() {
        let clock = ManualClock::at(0);
        let mut desk = HandoffDesk::new(MemoryStore::new(), &clock);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        let mut session = ComposerSession::new(SOCIAL);
        session.upload("https://cdn/a.png").unwrap();
        let before = session.state().clone();

        let report = session.reconcile_return(&mut desk, &mut ledger).unwrap();
        assert_eq!(report, ReturnReport::default());
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn autosave_restore_and_clear() {
        let mut durable = MemoryStore::new();
        let mut session = ComposerSession::new(SOCIAL);
        session.state_mut().topic = "garden".into();
        session.state_mut().keywords = "tulips, spring".into();
        session.upload(&png_uri(4, 4)).unwrap();
        assert_eq!(session.autosave(&mut durable), PersistOutcome::Written);
        assert_eq!(session.autosave(&mut durable), PersistOutcome::Unchanged);

        let raw = durable.get(&session.snapshot_key()).unwrap().unwrap();
        assert!(!raw.contains("base64"));

        let mut reloaded = ComposerSession::new(SOCIAL);
        assert!(reloaded.restore(&mut durable));
        assert_eq!(reloaded.state().topic, "garden");
        assert_eq!(reloaded.state().keywords, "tulips, spring");
        assert!(reloaded.state().media.is_empty());

        reloaded.state_mut().platform = Platform::YouTube;
        reloaded.clear_working_state(&mut durable);
        assert_eq!(reloaded.state().topic, "");
        assert_eq!(reloaded.state().platform, Platform::YouTube);
        assert!(!reloaded.restore(&mut durable));
    }
}
