use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::generator::GenerationClient;
use crate::models::{GenerationRequest, GenerationResult, Statistics};
use crate::services::Downloader;
use crate::tui::AppAction;
use crate::validation::{validate_field, validate_request, Field};

const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];
const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

// Progress reported by the running generation task
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub step: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    ImageUrl,
    ApiKey,
    Email,
    Video,
    History,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::ImageUrl => Focus::ApiKey,
            Focus::ApiKey => Focus::Email,
            Focus::Email => Focus::Video,
            Focus::Video => Focus::History,
            Focus::History => Focus::ImageUrl,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Focus::ImageUrl => Focus::History,
            Focus::ApiKey => Focus::ImageUrl,
            Focus::Email => Focus::ApiKey,
            Focus::Video => Focus::Email,
            Focus::History => Focus::Video,
        }
    }

    pub fn field(self) -> Option<Field> {
        match self {
            Focus::ImageUrl => Some(Field::ImageUrl),
            Focus::ApiKey => Some(Field::ApiKey),
            Focus::Email => Some(Field::Email),
            Focus::Video | Focus::History => None,
        }
    }

    pub fn is_text_input(self) -> bool {
        self.field().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Short-lived status message, the terminal stand-in for a toast.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    shown_at: Instant,
}

impl Notice {
    fn lifetime(&self) -> Duration {
        match self.kind {
            NoticeKind::Success => Duration::from_secs(3),
            NoticeKind::Error => Duration::from_secs(5),
        }
    }

    fn expired(&self) -> bool {
        self.shown_at.elapsed() >= self.lifetime()
    }
}

pub struct App {
    // Form
    pub form: GenerationRequest,
    pub focus: Focus,
    pub field_errors: HashMap<Field, String>,
    touched: HashSet<Field>,

    // Generation state
    pub loading: bool,
    pub progress: u8,
    pub current_step: String,
    pub result: Option<GenerationResult>,
    pub error: Option<String>,
    pub history: Vec<GenerationResult>,
    pub stats: Statistics,
    last_request: Option<GenerationRequest>,

    // UI State
    pub selected_index: usize,
    pub show_help: bool,
    pub confirm_clear: bool,
    pub notice: Option<Notice>,
    spinner_frame: usize,

    // Async state
    progress_tx: mpsc::UnboundedSender<ProgressUpdate>,
    progress_rx: mpsc::UnboundedReceiver<ProgressUpdate>,
    result_tx: mpsc::Sender<GenerationResult>,
    result_rx: mpsc::Receiver<GenerationResult>,
    task: Option<JoinHandle<()>>,

    // Services
    repository: Repository,
    generator: Arc<GenerationClient>,
    downloader: Downloader,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let generator = Arc::new(GenerationClient::new(config.api_url.clone(), config.pacing()));
        let downloader = Downloader::new(&config.download_dir);

        let mut app = Self::with_services(repository, generator, downloader).await;
        app.form.generate_video = config.default_video;
        Ok(app)
    }

    pub async fn with_services(
        repository: Repository,
        generator: Arc<GenerationClient>,
        downloader: Downloader,
    ) -> Self {
        let history = repository.read_history().await;
        let stats = repository.read_stats().await;
        let api_key = repository.load_credential().await;

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::channel(1);

        Self {
            form: GenerationRequest {
                api_key,
                ..Default::default()
            },
            focus: Focus::ImageUrl,
            field_errors: HashMap::new(),
            touched: HashSet::new(),
            loading: false,
            progress: 0,
            current_step: String::new(),
            result: None,
            error: None,
            history,
            stats,
            last_request: None,
            selected_index: 0,
            show_help: false,
            confirm_clear: false,
            notice: None,
            spinner_frame: 0,
            progress_tx,
            progress_rx,
            result_tx,
            result_rx,
            task: None,
            repository,
            generator,
            downloader,
        }
    }

    pub fn selected_history_item(&self) -> Option<&GenerationResult> {
        self.history.get(self.selected_index)
    }

    pub fn has_retry(&self) -> bool {
        self.last_request.is_some()
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER_FRAMES[self.spinner_frame % SPINNER_FRAMES.len()]
    }

    pub fn tick(&mut self) {
        if self.loading {
            self.spinner_frame = self.spinner_frame.wrapping_add(1);
        }
        if self.notice.as_ref().is_some_and(Notice::expired) {
            self.notice = None;
        }
    }

    pub async fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        match action {
            AppAction::Quit => return Ok(true),

            AppAction::FocusNext => self.move_focus(self.focus.next()),
            AppAction::FocusPrev => self.move_focus(self.focus.prev()),

            AppAction::InputChar(c) => self.input_char(c).await,
            AppAction::InputBackspace => self.input_backspace().await,

            AppAction::ToggleVideo => {
                if !self.loading {
                    self.form.generate_video = !self.form.generate_video;
                }
            }

            AppAction::Submit => {
                self.mark_all_touched();
                let request = self.form.clone();
                self.submit(request);
            }

            AppAction::Retry => self.retry(),

            AppAction::MoveUp => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                }
            }

            AppAction::MoveDown => {
                let len = self.history.len();
                if len > 0 && self.selected_index < len - 1 {
                    self.selected_index += 1;
                }
            }

            AppAction::ViewSelected => self.view_selected(),

            AppAction::DeleteSelected => {
                if let Some(id) = self.selected_history_item().map(|item| item.id.clone()) {
                    self.delete_history_item(&id).await;
                }
            }

            AppAction::ClearHistoryStart => {
                if !self.history.is_empty() {
                    self.confirm_clear = true;
                }
            }

            AppAction::ClearHistoryConfirm => {
                self.confirm_clear = false;
                self.clear_history().await;
            }

            AppAction::ClearHistoryCancel => {
                self.confirm_clear = false;
            }

            AppAction::OpenResult => self.open_result(),

            AppAction::DownloadResult => self.download_result().await,

            AppAction::ShowHelp => {
                self.show_help = true;
            }

            AppAction::HideHelp => {
                self.show_help = false;
            }
        }

        Ok(false)
    }

    // Form

    fn move_focus(&mut self, to: Focus) {
        if let Some(field) = self.focus.field() {
            self.touched.insert(field);
            self.revalidate(field);
        }
        self.focus = to;
    }

    fn field_value(&self, field: Field) -> &str {
        match field {
            Field::ImageUrl => &self.form.image_url,
            Field::ApiKey => &self.form.api_key,
            Field::Email => &self.form.email,
        }
    }

    fn field_value_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::ImageUrl => &mut self.form.image_url,
            Field::ApiKey => &mut self.form.api_key,
            Field::Email => &mut self.form.email,
        }
    }

    async fn input_char(&mut self, c: char) {
        if self.loading {
            return;
        }
        if let Some(field) = self.focus.field() {
            self.field_value_mut(field).push(c);
            self.after_edit(field).await;
        }
    }

    async fn input_backspace(&mut self) {
        if self.loading {
            return;
        }
        if let Some(field) = self.focus.field() {
            self.field_value_mut(field).pop();
            self.after_edit(field).await;
        }
    }

    async fn after_edit(&mut self, field: Field) {
        if field == Field::ApiKey && !self.form.api_key.is_empty() {
            self.repository.save_credential(&self.form.api_key).await;
        }
        if self.touched.contains(&field) {
            self.revalidate(field);
        }
    }

    fn revalidate(&mut self, field: Field) {
        match validate_field(field, self.field_value(field)) {
            Ok(()) => {
                self.field_errors.remove(&field);
            }
            Err(e) => {
                self.field_errors.insert(field, e.to_string());
            }
        }
    }

    fn mark_all_touched(&mut self) {
        for field in [Field::ImageUrl, Field::ApiKey, Field::Email] {
            self.touched.insert(field);
            self.revalidate(field);
        }
    }

    // Generation

    /// Validates `request` and, when it passes, starts a generation call in
    /// the background. Ignored while another call is running.
    pub fn submit(&mut self, request: GenerationRequest) {
        if self.loading {
            return;
        }

        if let Err(e) = validate_request(&request) {
            self.notify(NoticeKind::Error, e.to_string());
            return;
        }

        self.loading = true;
        self.progress = 0;
        self.current_step = "Starting...".to_string();
        self.error = None;
        self.result = None;
        self.last_request = Some(request.clone());

        let generator = Arc::clone(&self.generator);
        let progress_tx = self.progress_tx.clone();
        let result_tx = self.result_tx.clone();

        self.task = Some(tokio::spawn(async move {
            let mut on_progress = |percent: u8, step: Option<&str>| {
                let _ = progress_tx.send(ProgressUpdate {
                    percent,
                    step: step.map(str::to_string),
                });
            };
            let result = generator.generate(&request, &mut on_progress).await;
            let _ = result_tx.send(result).await;
        }));
    }

    /// Resubmits the last request once.
    pub fn retry(&mut self) {
        if let Some(request) = self.last_request.clone() {
            self.submit(request);
        }
    }

    /// Drains progress and picks up a finished generation (non-blocking).
    pub async fn poll_generation(&mut self) -> Result<()> {
        self.drain_progress();

        if !self.loading {
            return Ok(());
        }

        if let Ok(result) = self.result_rx.try_recv() {
            self.finish_generation(result).await;
            return Ok(());
        }

        let task_finished = self.task.as_ref().map_or(true, JoinHandle::is_finished);
        if task_finished {
            // The result is sent before the task ends, so check once more.
            if let Ok(result) = self.result_rx.try_recv() {
                self.finish_generation(result).await;
            } else {
                if let Some(task) = self.task.take() {
                    if let Err(e) = task.await {
                        tracing::error!("Generation task ended abnormally: {}", e);
                    }
                }
                self.error = Some(UNEXPECTED_ERROR.to_string());
                self.notify(NoticeKind::Error, UNEXPECTED_ERROR);
                self.reset_loading();
            }
        }

        Ok(())
    }

    fn drain_progress(&mut self) {
        while let Ok(update) = self.progress_rx.try_recv() {
            self.progress = update.percent;
            if let Some(step) = update.step {
                self.current_step = step;
            }
        }
    }

    async fn finish_generation(&mut self, result: GenerationResult) {
        self.drain_progress();
        self.task = None;

        self.repository.append_history(&result).await;
        self.stats = self
            .repository
            .recompute_stats(
                result.processing_time,
                result.input.generated_video,
                result.is_success(),
            )
            .await;
        self.history = self.repository.read_history().await;
        self.selected_index = 0;

        match result.error() {
            None => {
                self.result = Some(result);
                self.notify(NoticeKind::Success, "Content generated successfully!");
            }
            Some(error) => {
                self.error = Some(error.to_string());
                self.notify(NoticeKind::Error, "Generation failed");
            }
        }

        self.reset_loading();
    }

    fn reset_loading(&mut self) {
        self.loading = false;
        self.progress = 0;
        self.current_step.clear();
    }

    /// Runs one call to completion without the UI loop. With `retries` the
    /// bounded retry wrapper is used and only its final success is stored.
    pub async fn run_headless<P>(
        &mut self,
        request: GenerationRequest,
        retries: Option<u32>,
        on_progress: &mut P,
    ) -> Result<GenerationResult>
    where
        P: FnMut(u8, Option<&str>) + Send,
    {
        validate_request(&request).map_err(|e| AppError::Validation(e.to_string()))?;

        let result = match retries {
            Some(max_attempts) => {
                self.generator
                    .retry_generate(&request, on_progress, max_attempts)
                    .await?
            }
            None => self.generator.generate(&request, on_progress).await,
        };

        self.repository.append_history(&result).await;
        self.stats = self
            .repository
            .recompute_stats(result.processing_time, request.generate_video, result.is_success())
            .await;
        self.history = self.repository.read_history().await;

        Ok(result)
    }

    pub async fn save_api_key(&mut self, key: &str) -> Result<()> {
        crate::validation::validate_api_key(key).map_err(|e| AppError::Validation(e.to_string()))?;
        if !self.repository.save_credential(key).await {
            return Err(AppError::Config("Failed to save API key".to_string()));
        }
        self.form.api_key = key.to_string();
        Ok(())
    }

    // History

    fn view_selected(&mut self) {
        let Some(item) = self.selected_history_item() else {
            return;
        };
        if item.is_success() {
            self.result = Some(item.clone());
            self.error = None;
        }
    }

    pub async fn delete_history_item(&mut self, id: &str) {
        self.repository.delete_history_entry(id).await;
        self.history = self.repository.read_history().await;
        self.stats = self.repository.recompute_stats(0.0, false, true).await;

        let len = self.history.len();
        if len > 0 && self.selected_index >= len {
            self.selected_index = len - 1;
        } else if len == 0 {
            self.selected_index = 0;
        }
        self.notify(NoticeKind::Success, "Item deleted");
    }

    pub async fn clear_history(&mut self) {
        self.repository.clear_history().await;
        self.history = self.repository.read_history().await;
        self.stats = self.repository.recompute_stats(0.0, false, true).await;
        self.selected_index = 0;
        self.notify(NoticeKind::Success, "History cleared");
    }

    // Result actions

    fn open_result(&mut self) {
        let target = self
            .result
            .as_ref()
            .and_then(GenerationResult::assets)
            .and_then(|a| a.images.first().or(a.video.as_ref()))
            .cloned();

        if let Some(url) = target {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open {}: {}", url, e);
                self.notify(NoticeKind::Error, format!("Could not open browser: {e}"));
            }
        }
    }

    async fn download_result(&mut self) {
        let Some(result) = self.result.clone() else {
            return;
        };

        match self.downloader.download_result(&result).await {
            Ok(paths) if paths.is_empty() => {
                self.notify(NoticeKind::Error, "Download failed: nothing was saved");
            }
            Ok(paths) => {
                let text = format!(
                    "Downloaded {} file{} to {}",
                    paths.len(),
                    if paths.len() == 1 { "" } else { "s" },
                    self.downloader.dir().display()
                );
                self.notify(NoticeKind::Success, text);
            }
            Err(e) => {
                tracing::error!("Download failed: {:#}", e);
                self.notify(NoticeKind::Error, format!("Download failed: {e}"));
            }
        }
    }

    fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some(Notice {
            kind,
            text: text.into(),
            shown_at: Instant::now(),
        });
    }
}
