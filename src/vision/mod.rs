/// Subject segmentation
///
/// The `SegmentationEngine` runs the cutout pipeline on its own worker
/// thread, with its own store connection, and publishes the finished
/// cutout and the loading flag through observables drained on the UI
/// thread. A job runs to completion or failure once submitted; there
/// is no cancellation.
use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

use crate::observable::Observable;
use crate::state::store::CutoutStore;

pub mod cutout;
pub mod mask;
pub mod onnx;

use mask::SubjectMasker;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("no subject found in image")]
    NoSubjectFound,
    #[error("segmentation request failed: {0}")]
    RequestFailed(String),
    #[error("mask generation failed: {0}")]
    MaskGeneration(String),
    #[error("segmentation model unavailable: {0}")]
    ModelUnavailable(String),
}

type MaskerInit = Box<dyn FnOnce() -> Option<Box<dyn SubjectMasker>> + Send>;

pub struct SegmentationEngine {
    jobs: Option<Sender<DynamicImage>>,
    thread: Option<JoinHandle<()>>,

    /// True while a cutout is being produced.
    pub is_loading: Observable<bool>,
    /// The most recent finished cutout.
    pub cutout: Observable<Option<RgbaImage>>,
}

impl SegmentationEngine {
    /// Engine backed by the ONNX masker. Model loading happens on the
    /// worker thread; a missing model disables cutouts but leaves the
    /// rest of the app running.
    pub fn new(db_path: PathBuf) -> Self {
        Self::with_masker_init(
            db_path,
            Box::new(|| match onnx::OnnxMasker::new() {
                Ok(masker) => Some(Box::new(masker) as Box<dyn SubjectMasker>),
                Err(e) => {
                    log::warn!("Segmentation disabled: {e}");
                    None
                }
            }),
        )
    }

    pub fn with_masker(db_path: PathBuf, masker: Box<dyn SubjectMasker>) -> Self {
        Self::with_masker_init(db_path, Box::new(move || Some(masker)))
    }

    fn with_masker_init(db_path: PathBuf, masker_init: MaskerInit) -> Self {
        let (jobs, receiver) = unbounded();
        let is_loading = Observable::new(false);
        let cutout = Observable::new(None);

        let loading_handle = is_loading.clone();
        let finished_handle = cutout.clone();

        let thread = std::thread::Builder::new()
            .name(String::from("segmentation"))
            .spawn(move || worker(receiver, db_path, masker_init, loading_handle, finished_handle))
            .expect("Failed to spawn segmentation thread");

        SegmentationEngine {
            jobs: Some(jobs),
            thread: Some(thread),
            is_loading,
            cutout,
        }
    }

    /// Submit a still image for cutout creation. Sets the loading
    /// flag; completion (or failure) clears it again.
    pub fn create_cutout(&self, image: DynamicImage) {
        self.is_loading.set(true);
        let Some(jobs) = &self.jobs else {
            self.is_loading.set(false);
            return;
        };
        if jobs.send(image).is_err() {
            log::error!("Cutout requested after the segmentation worker shut down");
            self.is_loading.set(false);
        }
    }
}

impl Drop for SegmentationEngine {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        self.jobs = None;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn worker(
    jobs: Receiver<DynamicImage>,
    db_path: PathBuf,
    masker_init: MaskerInit,
    is_loading: Observable<bool>,
    finished: Observable<Option<RgbaImage>>,
) {
    log::info!("Segmentation worker started");

    // The worker owns its own store connection; SQLite connections
    // stay on the thread that opened them.
    let store = match CutoutStore::open(&db_path) {
        Ok(store) => Some(store),
        Err(e) => {
            log::error!("Cutout store unavailable to segmentation worker: {e}");
            None
        }
    };

    let mut masker = masker_init();

    while let Ok(image) = jobs.recv() {
        match &mut masker {
            Some(masker) => {
                match cutout::create_and_store_cutout(masker.as_mut(), store.as_ref(), &image) {
                    Ok(result) => {
                        log::info!(
                            "✂️  Cutout created ({}x{})",
                            result.width(),
                            result.height()
                        );
                        finished.set(Some(result));
                    }
                    Err(e) => log::error!("Cutout failed: {e}"),
                }
            }
            None => log::error!("Cutout requested but no segmentation model is loaded"),
        }
        is_loading.set(false);
    }

    log::info!("Segmentation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::mask::testing::StubMasker;
    use super::*;
    use crate::state::store::testing::temp_db_path;
    use std::time::Duration;

    fn wait_until_idle(engine: &SegmentationEngine) {
        let sub = engine.is_loading.subscribe();
        if !engine.is_loading.get() {
            return;
        }
        for _ in 0..20 {
            if let Some(false) = sub.recv_timeout(Duration::from_millis(500)) {
                return;
            }
        }
        panic!("segmentation never finished");
    }

    fn input_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            32,
            32,
            image::Rgba([90, 120, 150, 255]),
        ))
    }

    #[test]
    fn test_engine_produces_and_persists_cutout() {
        let path = temp_db_path();
        let masker = StubMasker::with_rect(32, 32, 8, 8, 24, 24);
        let engine = SegmentationEngine::with_masker(path.clone(), Box::new(masker));

        engine.create_cutout(input_image());
        wait_until_idle(&engine);

        assert!(engine.cutout.get().is_some());
        let store = CutoutStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_engine_with_no_subject_clears_loading_and_stores_nothing() {
        let path = temp_db_path();
        let masker = StubMasker::empty(32, 32);
        let engine = SegmentationEngine::with_masker(path.clone(), Box::new(masker));

        engine.create_cutout(input_image());
        wait_until_idle(&engine);

        assert!(!engine.is_loading.get());
        assert!(engine.cutout.get().is_none());
        let store = CutoutStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 0);

        let _ = std::fs::remove_file(path);
    }
}
