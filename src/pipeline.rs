use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use serde::Serialize;

use crate::archive;
use crate::catalog::{CatalogClient, QueryRequest};
use crate::config::ResolvedConfig;
use crate::domain::{
    BoundingBox, CloudCover, Credentials, DateRange, Footprint, ImageFormat, IndexKind, Scene,
};
use crate::error::{EoError, Stage, TileError};
use crate::fetch::Fetcher;
use crate::index::IndexCalculator;
use crate::lifecycle::{SceneLifecycle, SceneState};
use crate::progress::{self, Progress, ProgressSink};
use crate::render::{RenderResult, Renderer};
use crate::runlog::RunLog;
use crate::store::CacheStore;

pub const LOG_FILE: &str = "log.txt";
pub const REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub index: IndexKind,
    pub bbox: BoundingBox,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub cloud_cover: CloudCover,
    pub credentials: Credentials,
    pub image_format: ImageFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Validating,
    Authenticating,
    Querying,
    ProcessingScenes,
    Archiving,
    Done,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_root: Utf8PathBuf,
    pub workers: usize,
    pub platform: String,
}

impl PipelineOptions {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            output_root: config.output_root.clone(),
            workers: config.workers,
            platform: config.platform.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub scene_id: String,
    pub identifier: String,
    pub state: SceneState,
    pub downloaded: bool,
    pub extracted: bool,
    pub raster_path: Option<Utf8PathBuf>,
    pub image_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: RunState,
    pub states: Vec<RunState>,
    pub index: IndexKind,
    pub date_range: DateRange,
    pub dates_clamped: bool,
    pub scenes_found: usize,
    pub scenes: Vec<SceneReport>,
    pub failures: Vec<TileError>,
    pub skipped: Vec<String>,
    pub downloads: usize,
    pub extractions: usize,
    pub archive_path: Utf8PathBuf,
    pub archive_members: Vec<String>,
    pub preview: Utf8PathBuf,
    pub log_path: Utf8PathBuf,
    pub progress: u8,
    pub cancelled: bool,
}

enum SceneOutcome<'s> {
    Rendered {
        result: RenderResult<'s>,
        lifecycle: SceneLifecycle,
        downloaded: bool,
        extracted: bool,
    },
    Failed {
        scene: &'s Scene,
        error: TileError,
        lifecycle: SceneLifecycle,
        downloaded: bool,
        extracted: bool,
    },
    Skipped(&'s Scene),
}

pub struct Pipeline<C: CatalogClient> {
    store: CacheStore,
    client: C,
    options: PipelineOptions,
}

impl<C: CatalogClient> Pipeline<C> {
    pub fn new(store: CacheStore, client: C, options: PipelineOptions) -> Self {
        Self {
            store,
            client,
            options,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn run(
        &self,
        request: &RunRequest,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<RunReport, EoError> {
        let now = Utc::now();
        let (run_id, run_dir) = self.create_run_dir(&now.format("%Y%m%dT%H%M%S%3f").to_string())?;
        let log = RunLog::create(&run_dir.join(LOG_FILE), run_id.clone())?;
        let span = tracing::info_span!("run", run_id = %run_id, index = %request.index);
        let _entered = span.enter();
        let progress = Progress::new(sink);
        let mut states = Vec::new();

        states.push(RunState::Validating);
        log.info(&format!(
            "run {run_id}: index={} bbox={} cloud_cover<={} format={}",
            request.index, request.bbox, request.cloud_cover, request.image_format
        ));
        let footprint = Footprint::from_bbox(&request.bbox);
        let dates = DateRange::resolve(request.start, request.end, now);
        if dates.clamped {
            log.warn(&format!(
                "start date after end date; using {} .. {}",
                dates.range.start.to_rfc3339(),
                dates.range.end.to_rfc3339()
            ));
        }
        progress.report(progress::VALIDATED, "parameters validated");

        states.push(RunState::Authenticating);
        let session = match self.client.authenticate(&request.credentials) {
            Ok(session) => session,
            Err(err) => return Err(fail(&log, &mut states, err)),
        };
        log.info(&format!("authenticated as {}", session.username));

        states.push(RunState::Querying);
        progress.report(progress::QUERY_STARTED, "querying catalog");
        let query = QueryRequest {
            footprint,
            date_range: dates.range,
            platform: self.options.platform.clone(),
            cloud_cover_max: request.cloud_cover,
        };
        log.debug(&format!("footprint {}", query.footprint.to_wkt()));
        let found = match query
            .footprint
            .validate()
            .and_then(|()| self.client.query(&session, &query))
        {
            Ok(found) => found,
            Err(err) => return Err(fail(&log, &mut states, err)),
        };
        log.info(&format!("{} scene(s) found", found.len()));
        for scene in found.values() {
            log.scene(&scene.id, &describe(scene));
        }

        states.push(RunState::ProcessingScenes);
        let scenes: Vec<&Scene> = found.values().collect();
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                return Err(fail(&log, &mut states, EoError::WorkerPool(err.to_string())));
            }
        };
        let worker = SceneWorker {
            request,
            fetcher: Fetcher::new(&self.store, &self.client, &session),
            calculator: IndexCalculator::new(run_dir.join("rasters")),
            renderer: Renderer::new(run_dir.join("images")),
            log: &log,
            progress: &progress,
        };
        let outcomes: Vec<SceneOutcome<'_>> = pool.install(|| {
            scenes
                .par_iter()
                .map(|&scene| {
                    span.in_scope(|| {
                        if cancel.is_cancelled() {
                            SceneOutcome::Skipped(scene)
                        } else {
                            worker.process(scene)
                        }
                    })
                })
                .collect()
        });

        let mut images = Vec::new();
        let mut reports = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();
        let (mut downloads, mut extractions) = (0, 0);
        for outcome in outcomes {
            match outcome {
                SceneOutcome::Rendered {
                    result,
                    lifecycle,
                    downloaded,
                    extracted,
                } => {
                    downloads += usize::from(downloaded);
                    extractions += usize::from(extracted);
                    images.push(result.image_path.clone());
                    reports.push(SceneReport {
                        scene_id: result.index.scene.id.clone(),
                        identifier: result.index.scene.identifier.clone(),
                        state: lifecycle.state(),
                        downloaded,
                        extracted,
                        raster_path: Some(result.index.raster_path),
                        image_path: Some(result.image_path),
                    });
                }
                SceneOutcome::Failed {
                    scene,
                    error,
                    lifecycle,
                    downloaded,
                    extracted,
                } => {
                    downloads += usize::from(downloaded);
                    extractions += usize::from(extracted);
                    log.tile_error(&error);
                    reports.push(SceneReport {
                        scene_id: scene.id.clone(),
                        identifier: scene.identifier.clone(),
                        state: lifecycle.state(),
                        downloaded,
                        extracted,
                        raster_path: None,
                        image_path: None,
                    });
                    failures.push(error);
                }
                SceneOutcome::Skipped(scene) => {
                    log.warn(&format!("scene={} cancelled before dispatch", scene.id));
                    reports.push(SceneReport {
                        scene_id: scene.id.clone(),
                        identifier: scene.identifier.clone(),
                        state: SceneState::Queued,
                        downloaded: false,
                        extracted: false,
                        raster_path: None,
                        image_path: None,
                    });
                    skipped.push(scene.id.clone());
                }
            }
        }
        log.info(&format!(
            "{} of {} scene(s) rendered, {} failed, {} skipped",
            images.len(),
            scenes.len(),
            failures.len(),
            skipped.len()
        ));

        states.push(RunState::Archiving);
        let archive_path = run_dir.join(format!(
            "{}_images.zip",
            request.index.to_string().to_ascii_lowercase()
        ));
        let summary = match archive::bundle(&images, &archive_path, &log) {
            Ok(summary) => summary,
            Err(err) => return Err(fail(&log, &mut states, err)),
        };
        let preview = archive::select_preview(&images);
        log.info(&format!("preview {preview}"));
        progress.report(progress::ARCHIVED, "archive written");

        states.push(RunState::Done);
        progress.report(progress::DONE, "done");
        log.info("run finished");

        let report = RunReport {
            run_id,
            state: RunState::Done,
            states,
            index: request.index,
            date_range: dates.range,
            dates_clamped: dates.clamped,
            scenes_found: scenes.len(),
            scenes: reports,
            failures,
            skipped,
            downloads,
            extractions,
            archive_path: summary.path,
            archive_members: summary.members,
            preview,
            log_path: log.path().to_path_buf(),
            progress: progress.current(),
            cancelled: cancel.is_cancelled(),
        };
        write_report(&report, &run_dir.join(REPORT_FILE), &log);
        Ok(report)
    }

    fn create_run_dir(&self, stamp: &str) -> Result<(String, Utf8PathBuf), EoError> {
        fs::create_dir_all(self.options.output_root.as_std_path())
            .map_err(|err| EoError::Filesystem(err.to_string()))?;
        for attempt in 0..100u32 {
            let run_id = match attempt {
                0 => format!("run-{stamp}"),
                n => format!("run-{stamp}-{n}"),
            };
            let run_dir = self.options.output_root.join(&run_id);
            match fs::create_dir(run_dir.as_std_path()) {
                Ok(()) => return Ok((run_id, run_dir)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(EoError::Filesystem(err.to_string())),
            }
        }
        Err(EoError::Filesystem(format!(
            "no free run directory under {}",
            self.options.output_root
        )))
    }
}

struct SceneWorker<'a, C: CatalogClient + ?Sized> {
    request: &'a RunRequest,
    fetcher: Fetcher<'a, C>,
    calculator: IndexCalculator,
    renderer: Renderer,
    log: &'a RunLog,
    progress: &'a Progress<'a>,
}

impl<C: CatalogClient + ?Sized> SceneWorker<'_, C> {
    fn process<'s>(&self, scene: &'s Scene) -> SceneOutcome<'s> {
        let mut lifecycle = SceneLifecycle::new(scene.id.clone());

        self.progress
            .report(progress::SCENE_FETCH, format!("fetching {}", scene.id));
        let fetched = match self.fetcher.fetch(scene, &mut lifecycle, self.log) {
            Ok(fetched) => fetched,
            Err(error) => {
                return SceneOutcome::Failed {
                    scene,
                    downloaded: lifecycle.history().contains(&SceneState::Downloaded),
                    extracted: false,
                    error,
                    lifecycle,
                };
            }
        };

        self.progress.report(
            progress::SCENE_COMPUTE,
            format!("computing {} for {}", self.request.index, scene.id),
        );
        lifecycle.advance(SceneState::Computing);
        let stage_result = self
            .calculator
            .compute(scene, &fetched.resource, self.request.index)
            .and_then(|index| {
                lifecycle.advance(SceneState::Computed);
                lifecycle.advance(SceneState::Rendering);
                self.renderer.render(index, self.request.image_format)
            });

        match stage_result {
            Ok(result) => {
                lifecycle.advance(SceneState::Rendered);
                SceneOutcome::Rendered {
                    result,
                    lifecycle,
                    downloaded: fetched.downloaded,
                    extracted: fetched.extracted,
                }
            }
            Err(error) => {
                lifecycle.fail(error.stage);
                SceneOutcome::Failed {
                    scene,
                    error,
                    lifecycle,
                    downloaded: fetched.downloaded,
                    extracted: fetched.extracted,
                }
            }
        }
    }
}

fn fail(log: &RunLog, states: &mut Vec<RunState>, err: EoError) -> EoError {
    let during = states
        .last()
        .map(|state| format!(" during {state:?}"))
        .unwrap_or_default();
    states.push(RunState::Failed);
    log.error(&format!("run failed{during}: {err}"));
    err
}

fn describe(scene: &Scene) -> String {
    let mut parts = vec![format!("identifier={}", scene.identifier)];
    if let Some(date) = scene.acquisition_date {
        parts.push(format!("begin={}", date.to_rfc3339()));
    }
    if let Some(cloud) = scene.cloud_cover_percent {
        parts.push(format!("cloud={cloud:.1}%"));
    }
    if let Some(kind) = &scene.product_type {
        parts.push(format!("type={kind}"));
    }
    if let Some(size) = scene.size_bytes {
        parts.push(format!("size={size}"));
    }
    parts.join(" ")
}

fn write_report(report: &RunReport, path: &Utf8Path, log: &RunLog) {
    let written = serde_json::to_string_pretty(report)
        .map_err(|err| err.to_string())
        .and_then(|json| fs::write(path.as_std_path(), json).map_err(|err| err.to_string()));
    if let Err(err) = written {
        log.warn(&format!("could not write {path}: {err}"));
    }
}

pub fn failed_stage(report: &SceneReport) -> Option<Stage> {
    match report.state {
        SceneState::Failed(stage) => Some(stage),
        _ => None,
    }
}
