use std::sync::Arc;

use crate::adapters::{FFprobeAdapter, FfmpegAdapter, JsonFileStore, TokioFsAdapter};
use crate::app::{
    clean_interactor::CleanInteractor, consolidate_interactor::ConsolidateInteractor,
    scan_interactor::ScanInteractor,
};
use crate::engine::progress::ProgressSink;
use crate::ports::{FsPort, ProbePort, RenderPort, StorePort};

pub trait AppContainer: Send + Sync {
    fn scan_interactor(&self) -> Arc<ScanInteractor>;
    fn consolidate_interactor(&self) -> Arc<ConsolidateInteractor>;
    fn clean_interactor(&self) -> Arc<CleanInteractor>;
}

pub struct DefaultAppContainer {
    scan_interactor: Arc<ScanInteractor>,
    consolidate_interactor: Arc<ConsolidateInteractor>,
    clean_interactor: Arc<CleanInteractor>,
}

impl DefaultAppContainer {
    /// Wire the ffprobe/ffmpeg, tokio filesystem and JSON store adapters
    pub fn new(sink: ProgressSink) -> Self {
        Self::with_ports(
            Arc::new(TokioFsAdapter::new()),
            Arc::new(JsonFileStore::new()),
            Arc::new(FFprobeAdapter::new()),
            Arc::new(FfmpegAdapter::new()),
            sink,
        )
    }

    /// Wire arbitrary port implementations
    pub fn with_ports(
        fs_port: Arc<dyn FsPort>,
        store: Arc<dyn StorePort>,
        probe_port: Arc<dyn ProbePort>,
        render_port: Arc<dyn RenderPort>,
        sink: ProgressSink,
    ) -> Self {
        let scan_interactor = Arc::new(ScanInteractor::new(Arc::clone(&fs_port)));

        let consolidate_interactor = Arc::new(ConsolidateInteractor::new(
            Arc::clone(&fs_port),
            Arc::clone(&store),
            Arc::clone(&probe_port),
            Arc::clone(&render_port),
            sink,
        ));

        let clean_interactor = Arc::new(CleanInteractor::new(
            Arc::clone(&fs_port),
            Arc::clone(&store),
            Arc::clone(&probe_port),
        ));

        Self {
            scan_interactor,
            consolidate_interactor,
            clean_interactor,
        }
    }
}

impl AppContainer for DefaultAppContainer {
    fn scan_interactor(&self) -> Arc<ScanInteractor> {
        Arc::clone(&self.scan_interactor)
    }

    fn consolidate_interactor(&self) -> Arc<ConsolidateInteractor> {
        Arc::clone(&self.consolidate_interactor)
    }

    fn clean_interactor(&self) -> Arc<CleanInteractor> {
        Arc::clone(&self.clean_interactor)
    }
}
