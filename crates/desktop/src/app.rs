//! Twin Desktop: egui app state and UI.
//!
//! Controller operations run on a tokio runtime owned by the app. Each frame the UI copies the
//! controller's state when no update is being applied and renders that copy, so a long request (a
//! reply being generated) never blocks drawing or other operations.

use eframe::egui;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::mpsc;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use twin::api::{Persona, Role};
use twin::context::ClientContext;
use twin::controller::{ChatController, ChatState, DeletionReport, NoticeKind, Panel};
use twin::forms::{LoginForm, PersonaForm, RegisterForm};
use twin::personas::{AvatarResolver, PersonaAction, PersonaRegistry};
use twin::sidebar::Sidebar;
use twin::transcript::Bubble;

const CHAT_INPUT_HEIGHT: f32 = 90.0;
const CHAT_MESSAGES_MIN_HEIGHT: f32 = 80.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;
const FORM_WIDTH: f32 = 320.0;

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info || metadata.target().starts_with("twin")
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} [{}] {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

static LOGGER: DesktopLogger = DesktopLogger;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Home,
    Login,
    Register,
    Chat,
    Logs,
}

/// Outcome of a background job, read by the UI thread.
enum JobResult {
    LoggedIn(Result<String, String>),
    Registered(Result<String, String>),
    PersonaSubmitted(Result<String, String>),
    ConversationDeleted(Result<(), String>),
    PersonaDeleted(DeletionReport),
    Done,
}

/// Something the user did this frame; applied after rendering.
enum Action {
    Goto(Screen),
    Logout,
    SubmitLogin,
    SubmitRegister,
    Select(String),
    NewChat,
    PersonaClicked(Persona),
    ToggleDeleteMode,
    ConfirmDeletePersona,
    CancelDeletePersona,
    OpenCreate,
    CancelCreate,
    SubmitPersona,
    Send,
    RequestDeleteConversation(String),
    ConfirmDeleteConversation,
    CancelDeleteConversation,
    DismissNotice,
}

pub struct TwinApp {
    runtime: Option<tokio::runtime::Runtime>,
    context: Option<ClientContext>,
    /// Config or runtime failure at start-up.
    startup_error: Option<String>,
    /// Present while signed in; replaced on every login.
    controller: Option<ChatController>,
    /// Last state read from the controller.
    snapshot: ChatState,
    mounted: bool,
    jobs: Vec<mpsc::Receiver<JobResult>>,
    actions: Vec<Action>,
    current_screen: Screen,
    login_form: LoginForm,
    login_error: Option<String>,
    login_pending: bool,
    register_form: RegisterForm,
    register_error: Option<String>,
    register_pending: bool,
    /// Shown on the login screen after an account was created.
    registered_notice: Option<String>,
    persona_form: PersonaForm,
    persona_error: Option<String>,
    persona_pending: bool,
    avatars: Option<AvatarResolver>,
    avatar_choices: Vec<String>,
    sidebar: Sidebar,
    registry: PersonaRegistry,
    draft: String,
}

impl TwinApp {
    /// Space between the main screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 48.0;

    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("desktop started");

        let mut startup_error = None;
        let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(rt) => Some(rt),
            Err(e) => {
                log::error!("could not start async runtime: {}", e);
                startup_error = Some(format!("could not start async runtime: {}", e));
                None
            }
        };
        let context = match ClientContext::open(None) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                log::error!("could not load configuration: {:#}", e);
                startup_error = Some(format!("could not load configuration: {:#}", e));
                None
            }
        };
        let avatars = context.as_ref().map(ClientContext::avatars);
        let avatar_choices = avatars
            .as_ref()
            .map(AvatarResolver::discover)
            .unwrap_or_else(|| vec!["default".to_string()]);

        let mut app = Self {
            runtime,
            context,
            startup_error,
            controller: None,
            snapshot: ChatState::default(),
            mounted: false,
            jobs: Vec::new(),
            actions: Vec::new(),
            current_screen: Screen::default(),
            login_form: LoginForm::default(),
            login_error: None,
            login_pending: false,
            register_form: RegisterForm::default(),
            register_error: None,
            register_pending: false,
            registered_notice: None,
            persona_form: PersonaForm::default(),
            persona_error: None,
            persona_pending: false,
            avatars,
            avatar_choices,
            sidebar: Sidebar::default(),
            registry: PersonaRegistry::default(),
            draft: String::new(),
        };
        if app.signed_in() {
            app.start_chat_session();
            app.current_screen = Screen::Chat;
        }
        app
    }

    fn signed_in(&self) -> bool {
        self.context
            .as_ref()
            .is_some_and(|c| c.session.is_signed_in())
    }

    /// Fresh controller for the signed-in user; mounted on the next Chat frame.
    fn start_chat_session(&mut self) {
        if let Some(ref ctx) = self.context {
            self.controller = Some(ctx.controller());
        }
        self.snapshot = ChatState::default();
        self.mounted = false;
        self.sidebar = Sidebar::default();
        self.registry = PersonaRegistry::default();
        self.draft.clear();
    }

    fn end_chat_session(&mut self) {
        self.controller = None;
        self.snapshot = ChatState::default();
        self.mounted = false;
    }

    /// Run `job` on the runtime and deliver its result through a receiver polled each frame.
    fn spawn_job<F>(&mut self, ctx: &egui::Context, job: F)
    where
        F: Future<Output = JobResult> + Send + 'static,
    {
        let Some(ref runtime) = self.runtime else {
            log::warn!("no async runtime; dropping job");
            return;
        };
        let (tx, rx) = mpsc::channel();
        let repaint = ctx.clone();
        runtime.spawn(async move {
            let result = job.await;
            let _ = tx.send(result);
            repaint.request_repaint();
        });
        self.jobs.push(rx);
    }

    /// Run a controller operation in the background; later frames pick up its effects.
    fn run_controller<F, Fut>(&mut self, ctx: &egui::Context, op: F)
    where
        F: FnOnce(ChatController) -> Fut,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let Some(controller) = self.controller.clone() else {
            return;
        };
        self.spawn_job(ctx, op(controller));
    }

    fn refresh_snapshot(&mut self) {
        if let Some(state) = self.controller.as_ref().and_then(ChatController::try_snapshot) {
            self.snapshot = state;
        }
    }

    fn poll_jobs(&mut self) {
        let mut finished = Vec::new();
        self.jobs.retain(|rx| match rx.try_recv() {
            Ok(result) => {
                finished.push(result);
                false
            }
            Err(mpsc::TryRecvError::Empty) => true,
            Err(mpsc::TryRecvError::Disconnected) => false,
        });
        for result in finished {
            self.handle_job(result);
        }
    }

    fn handle_job(&mut self, result: JobResult) {
        match result {
            JobResult::LoggedIn(Ok(username)) => {
                log::info!("logged in as {}", username);
                self.login_pending = false;
                self.login_form = LoginForm::default();
                self.login_error = None;
                self.registered_notice = None;
                self.start_chat_session();
                self.current_screen = Screen::Chat;
            }
            JobResult::LoggedIn(Err(e)) => {
                self.login_pending = false;
                self.login_error = Some(e);
            }
            JobResult::Registered(Ok(username)) => {
                self.register_pending = false;
                self.register_form = RegisterForm::default();
                self.register_error = None;
                self.registered_notice = Some(format!("Account {} created. You can log in now.", username));
                self.login_form.username = username;
                self.current_screen = Screen::Login;
            }
            JobResult::Registered(Err(e)) => {
                self.register_pending = false;
                self.register_error = Some(e);
            }
            JobResult::PersonaSubmitted(Ok(_)) => {
                self.persona_pending = false;
                self.persona_form = PersonaForm::default();
                self.persona_error = None;
            }
            JobResult::PersonaSubmitted(Err(e)) => {
                self.persona_pending = false;
                self.persona_error = Some(e);
            }
            JobResult::ConversationDeleted(Ok(())) => self.sidebar.deleted(Instant::now()),
            JobResult::ConversationDeleted(Err(e)) => log::debug!("conversation delete failed: {}", e),
            JobResult::PersonaDeleted(report) => {
                log::info!("persona {} deletion: {}", report.persona_id, report.summary())
            }
            JobResult::Done => {}
        }
    }

    /// Chat needs a session; login and register are pointless with one. A rejected token ends the
    /// chat session and sends the user back to login.
    fn apply_route_guards(&mut self) {
        if self.snapshot.login_required {
            self.end_chat_session();
            self.login_error = Some("Your session has expired. Please log in again.".to_string());
            self.current_screen = Screen::Login;
            return;
        }
        let signed_in = self.signed_in();
        match self.current_screen {
            Screen::Chat if !signed_in => self.current_screen = Screen::Login,
            Screen::Login | Screen::Register if signed_in => self.current_screen = Screen::Home,
            _ => {}
        }
    }

    fn ensure_mounted(&mut self, ctx: &egui::Context) {
        if self.current_screen != Screen::Chat || self.mounted || !self.signed_in() {
            return;
        }
        if self.controller.is_none() {
            self.start_chat_session();
        }
        if self.controller.is_none() {
            return;
        }
        self.mounted = true;
        self.run_controller(ctx, |c| async move {
            c.mount().await;
            JobResult::Done
        });
    }

    fn apply(&mut self, ctx: &egui::Context, action: Action) {
        match action {
            Action::Goto(screen) => self.current_screen = screen,
            Action::Logout => {
                if let Some(ref c) = self.context {
                    if let Err(e) = twin::auth::logout(&c.session) {
                        log::warn!("logout failed: {}", e);
                    }
                }
                self.end_chat_session();
                self.current_screen = Screen::Home;
            }
            Action::SubmitLogin => {
                let Some(ref c) = self.context else { return };
                let backend = c.backend();
                let session = c.session.clone();
                let form = self.login_form.clone();
                self.login_pending = true;
                self.login_error = None;
                self.spawn_job(ctx, async move {
                    let result = twin::auth::login(backend.as_ref(), &session, &form).await;
                    JobResult::LoggedIn(result.map(|s| s.username).map_err(|e| e.to_string()))
                });
            }
            Action::SubmitRegister => {
                let Some(ref c) = self.context else { return };
                let backend = c.backend();
                let form = self.register_form.clone();
                self.register_pending = true;
                self.register_error = None;
                self.spawn_job(ctx, async move {
                    let result = twin::auth::register(backend.as_ref(), &form).await;
                    JobResult::Registered(result.map(|u| u.username).map_err(|e| e.to_string()))
                });
            }
            Action::Select(session_id) => self.run_controller(ctx, |c| async move {
                c.select_conversation(&session_id).await;
                JobResult::Done
            }),
            Action::NewChat => self.run_controller(ctx, |c| async move {
                c.new_chat().await;
                JobResult::Done
            }),
            Action::PersonaClicked(persona) => match self.registry.click(&persona) {
                PersonaAction::Select(name) => self.run_controller(ctx, |c| async move {
                    c.pick_persona(&name).await;
                    JobResult::Done
                }),
                PersonaAction::RequestDelete(id) => log::debug!("delete requested for persona {}", id),
            },
            Action::ToggleDeleteMode => self.registry.toggle_delete_mode(),
            Action::ConfirmDeletePersona => {
                let Some(id) = self.registry.confirm_delete() else { return };
                self.run_controller(ctx, |c| async move { JobResult::PersonaDeleted(c.delete_persona(id).await) });
            }
            Action::CancelDeletePersona => self.registry.cancel_delete(),
            Action::OpenCreate => {
                self.persona_error = None;
                if let Some(ref avatars) = self.avatars {
                    self.avatar_choices = avatars.discover();
                }
                self.run_controller(ctx, |c| async move {
                    c.open_persona_create().await;
                    JobResult::Done
                });
            }
            Action::CancelCreate => {
                self.persona_error = None;
                self.run_controller(ctx, |c| async move {
                    c.cancel_persona_create().await;
                    JobResult::Done
                });
            }
            Action::SubmitPersona => {
                let payload = match self.persona_form.validate() {
                    Ok(p) => p,
                    Err(e) => {
                        self.persona_error = Some(e.to_string());
                        return;
                    }
                };
                if self.controller.is_none() {
                    return;
                }
                self.persona_pending = true;
                self.persona_error = None;
                self.run_controller(ctx, |c| async move {
                    let result = c.submit_persona(&payload).await;
                    JobResult::PersonaSubmitted(result.map(|p| p.name).map_err(|e| e.to_string()))
                });
            }
            Action::Send => self.send_draft(ctx),
            Action::RequestDeleteConversation(session_id) => self.sidebar.request_delete(session_id),
            Action::ConfirmDeleteConversation => {
                let Some(session_id) = self.sidebar.confirm_delete() else { return };
                self.run_controller(ctx, |c| async move {
                    let result = c.delete_conversation(&session_id).await;
                    JobResult::ConversationDeleted(result.map_err(|e| e.to_string()))
                });
            }
            Action::CancelDeleteConversation => self.sidebar.cancel_delete(),
            Action::DismissNotice => self.run_controller(ctx, |c| async move {
                c.dismiss_notice().await;
                JobResult::Done
            }),
        }
    }

    /// The user message shows up as soon as the job starts; the reply arrives in the background.
    fn send_draft(&mut self, ctx: &egui::Context) {
        let draft = std::mem::take(&mut self.draft);
        if draft.trim().is_empty() {
            return;
        }
        self.run_controller(ctx, |c| async move {
            c.send_message(&draft).await;
            JobResult::Done
        });
    }

    fn ui_home(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Digital Twin");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        ui.label("Interview personas built from real profiles. Pick a persona and start a conversation.");
        ui.add_space(12.0);
        if let Some(ref err) = self.startup_error {
            ui.colored_label(egui::Color32::RED, err.as_str());
            ui.add_space(8.0);
        }
        if let Some(ref c) = self.context {
            ui.label(format!("Backend: {}", c.client.base_url()));
            ui.add_space(12.0);
            match c.session.username() {
                Some(name) => {
                    ui.label(format!("Signed in as {}", name));
                    ui.add_space(8.0);
                    if ui.button("Open chat").clicked() {
                        self.actions.push(Action::Goto(Screen::Chat));
                    }
                }
                None => {
                    ui.horizontal(|ui| {
                        if ui.button("Log in").clicked() {
                            self.actions.push(Action::Goto(Screen::Login));
                        }
                        if ui.button("Create account").clicked() {
                            self.actions.push(Action::Goto(Screen::Register));
                        }
                    });
                }
            }
        }
    }

    fn ui_login(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Log in");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        if let Some(ref notice) = self.registered_notice {
            ui.colored_label(egui::Color32::from_rgb(60, 160, 90), notice.as_str());
            ui.add_space(8.0);
        }
        let mut submit = false;
        egui::Grid::new("login_form")
            .num_columns(2)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                ui.label("Username");
                ui.add(egui::TextEdit::singleline(&mut self.login_form.username).desired_width(FORM_WIDTH));
                ui.end_row();
                ui.label("Password");
                let password = ui.add(
                    egui::TextEdit::singleline(&mut self.login_form.password)
                        .password(true)
                        .desired_width(FORM_WIDTH),
                );
                if password.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    submit = true;
                }
                ui.end_row();
            });
        ui.add_space(8.0);
        if let Some(ref err) = self.login_error {
            ui.colored_label(egui::Color32::RED, err.as_str());
            ui.add_space(8.0);
        }
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!self.login_pending, egui::Button::new("Log in"))
                .clicked()
            {
                submit = true;
            }
            if self.login_pending {
                ui.spinner();
            }
            if ui.link("Create an account").clicked() {
                self.actions.push(Action::Goto(Screen::Register));
            }
        });
        if submit && !self.login_pending {
            self.actions.push(Action::SubmitLogin);
        }
    }

    fn ui_register(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Create account");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        let form = &mut self.register_form;
        egui::Grid::new("register_form")
            .num_columns(2)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                ui.label("Username");
                ui.add(egui::TextEdit::singleline(&mut form.username).desired_width(FORM_WIDTH));
                ui.end_row();
                ui.label("Full name");
                ui.add(egui::TextEdit::singleline(&mut form.full_name).desired_width(FORM_WIDTH));
                ui.end_row();
                ui.label("Email");
                ui.add(egui::TextEdit::singleline(&mut form.email).desired_width(FORM_WIDTH));
                ui.end_row();
                ui.label("Password");
                ui.add(
                    egui::TextEdit::singleline(&mut form.password)
                        .password(true)
                        .desired_width(FORM_WIDTH),
                );
                ui.end_row();
                ui.label("Confirm password");
                ui.add(
                    egui::TextEdit::singleline(&mut form.confirm_password)
                        .password(true)
                        .desired_width(FORM_WIDTH),
                );
                ui.end_row();
            });
        ui.add_space(8.0);
        if let Some(ref err) = self.register_error {
            ui.colored_label(egui::Color32::RED, err.as_str());
            ui.add_space(8.0);
        }
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!self.register_pending, egui::Button::new("Register"))
                .clicked()
            {
                match self.register_form.validate() {
                    Ok(_) => self.actions.push(Action::SubmitRegister),
                    Err(e) => self.register_error = Some(e.to_string()),
                }
            }
            if self.register_pending {
                ui.spinner();
            }
            if ui.link("Back to login").clicked() {
                self.actions.push(Action::Goto(Screen::Login));
            }
        });
    }

    fn ui_conversation_list(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Conversations");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        if ui.button("New chat").clicked() {
            self.actions.push(Action::NewChat);
        }
        ui.add_space(8.0);

        let rows = self.snapshot.conversations.clone();
        let current = self.snapshot.current_session.clone();
        if rows.is_empty() && self.snapshot.panel != Panel::Loading {
            ui.label("No conversations yet.");
        }
        let actions = &mut self.actions;
        let available = ui.available_height();
        egui::ScrollArea::vertical()
            .max_height((available - Self::SCREEN_FOOTER_SPACING).max(0.0))
            .show(ui, |ui| {
                for row in &rows {
                    ui.horizontal(|ui| {
                        let selected = Sidebar::is_selected(row, current.as_deref());
                        let text = format!("{}\n{}", Sidebar::caption(row), Sidebar::preview(row));
                        if ui.selectable_label(selected, text).clicked() {
                            actions.push(Action::Select(row.session_id.clone()));
                        }
                        if ui
                            .small_button("🗑")
                            .on_hover_text("Delete conversation")
                            .clicked()
                        {
                            actions.push(Action::RequestDeleteConversation(row.session_id.clone()));
                        }
                    });
                    ui.add_space(4.0);
                }
            });

        if let Some(toast) = self.sidebar.toast(Instant::now()) {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::from_rgb(60, 160, 90), toast.text.as_str());
        }
    }

    fn ui_chat(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        if let Some(notice) = self.snapshot.visible_notice(Instant::now()).cloned() {
            let color = match notice.kind {
                NoticeKind::Success => egui::Color32::from_rgb(60, 160, 90),
                NoticeKind::Error => egui::Color32::RED,
            };
            ui.horizontal(|ui| {
                ui.colored_label(color, notice.text.as_str());
                if ui.small_button("✕").clicked() {
                    self.actions.push(Action::DismissNotice);
                }
            });
            ui.add_space(8.0);
        }
        match self.snapshot.panel.clone() {
            Panel::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading…");
                });
            }
            Panel::PersonaPicker => self.ui_persona_picker(ui),
            Panel::PersonaCreate => self.ui_persona_create(ui),
            Panel::CreatingChat { persona } => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Starting a conversation with {}…", persona));
                });
            }
            Panel::ChatActive => self.ui_chat_window(ui),
        }
    }

    fn ui_persona_picker(&mut self, ui: &mut egui::Ui) {
        ui.heading("Choose a persona");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        let delete_mode = self.registry.delete_mode();
        ui.horizontal(|ui| {
            if ui.button("Create persona").clicked() {
                self.actions.push(Action::OpenCreate);
            }
            let mut toggled = delete_mode;
            if ui.checkbox(&mut toggled, "Delete mode").changed() {
                self.actions.push(Action::ToggleDeleteMode);
            }
        });
        ui.add_space(12.0);
        if delete_mode {
            ui.label("Click a persona to delete it together with its conversations.");
            ui.add_space(8.0);
        }

        let personas = self.snapshot.personas.clone();
        if personas.is_empty() {
            ui.label("No personas yet. Create one to start chatting.");
            return;
        }
        let hovers: Vec<String> = personas
            .iter()
            .map(|p| match self.avatars {
                Some(ref a) => a.resolve(p).display().to_string(),
                None => p.name.clone(),
            })
            .collect();
        let actions = &mut self.actions;
        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.horizontal_wrapped(|ui| {
                for (p, hover) in personas.iter().zip(&hovers) {
                    let label = match p.age {
                        Some(age) if !p.location.is_empty() => format!("{}\n{} · {}", p.name, age, p.location),
                        Some(age) => format!("{}\n{}", p.name, age),
                        None => p.name.clone(),
                    };
                    let mut button = egui::Button::new(label).min_size(egui::vec2(160.0, 60.0));
                    if delete_mode {
                        button = button.fill(egui::Color32::from_rgb(120, 40, 40));
                    }
                    if ui.add(button).on_hover_text(hover.as_str()).clicked() {
                        actions.push(Action::PersonaClicked(p.clone()));
                    }
                }
            });
        });
    }

    fn ui_persona_create(&mut self, ui: &mut egui::Ui) {
        ui.heading("Create persona");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        let available = ui.available_height();
        let form = &mut self.persona_form;
        let choices = &self.avatar_choices;
        egui::ScrollArea::vertical()
            .max_height((available - 120.0).max(120.0))
            .show(ui, |ui| {
                egui::Grid::new("persona_form")
                    .num_columns(2)
                    .spacing([12.0, 8.0])
                    .show(ui, |ui| {
                        for (label, slot) in form.fields_mut() {
                            ui.label(label);
                            if matches!(label, "Name" | "Age" | "Location") {
                                ui.add(egui::TextEdit::singleline(slot).desired_width(FORM_WIDTH));
                            } else {
                                ui.add(
                                    egui::TextEdit::multiline(slot)
                                        .desired_rows(2)
                                        .desired_width(FORM_WIDTH * 1.5),
                                );
                            }
                            ui.end_row();
                        }
                        ui.label("Avatar");
                        let selected = form.avatar.clone().unwrap_or_else(|| "default".to_string());
                        egui::ComboBox::from_id_source("avatar_select")
                            .selected_text(selected.as_str())
                            .show_ui(ui, |ui| {
                                for a in choices {
                                    if ui.selectable_label(selected == *a, a.as_str()).clicked() {
                                        form.avatar = Some(a.clone());
                                    }
                                }
                            });
                        ui.end_row();
                    });
            });
        ui.add_space(8.0);
        if let Some(ref err) = self.persona_error {
            ui.colored_label(egui::Color32::RED, err.as_str());
            ui.add_space(8.0);
        }
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!self.persona_pending, egui::Button::new("Create"))
                .clicked()
            {
                self.actions.push(Action::SubmitPersona);
            }
            if ui.button("Cancel").clicked() {
                self.actions.push(Action::CancelCreate);
            }
            if self.persona_pending {
                ui.spinner();
            }
        });
    }

    /// Renders one bubble: user messages highlighted, failed sends outlined in red.
    fn render_bubble(ui: &mut egui::Ui, bubble: &Bubble, persona: &str) {
        let is_user = bubble.message.role == Role::User;
        let stroke_color = if bubble.failed {
            egui::Color32::RED
        } else {
            ui.style().visuals.widgets.noninteractive.bg_stroke.color
        };
        let frame = egui::Frame::none()
            .fill(if is_user {
                ui.style().visuals.extreme_bg_color
            } else {
                ui.style().visuals.panel_fill
            })
            .stroke(egui::Stroke::new(1.0, stroke_color))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));

        frame.show(ui, |ui| {
            if is_user {
                ui.label(egui::RichText::new("You").small().weak());
                ui.label(egui::RichText::new(bubble.message.content.as_str()).strong());
            } else {
                ui.label(egui::RichText::new(persona).small().weak());
                if bubble.failed {
                    ui.colored_label(egui::Color32::RED, bubble.message.content.as_str());
                } else {
                    ui.label(bubble.message.content.as_str());
                }
            }
        });
    }

    /// Messages area fills the space above a fixed input row, sticking to the bottom.
    fn ui_chat_window(&mut self, ui: &mut egui::Ui) {
        let persona = self
            .snapshot
            .selected_persona
            .clone()
            .unwrap_or_else(|| "Assistant".to_string());
        ui.heading(format!("Chat with {}", persona));
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let bubbles: Vec<Bubble> = self.snapshot.transcript.visible().cloned().collect();
        let typing = self.snapshot.transcript.is_typing();

        let row_height = ui.spacing().interact_size.y + 8.0;
        let bottom_section_height = CHAT_INPUT_HEIGHT + 8.0 + row_height + Self::SCREEN_FOOTER_SPACING;
        let available = ui.available_height();
        let messages_height = (available - bottom_section_height).max(CHAT_MESSAGES_MIN_HEIGHT);
        let messages_width = ui.available_width();
        let messages_rect = ui
            .allocate_exact_size(egui::vec2(messages_width, messages_height), egui::Sense::hover())
            .0;
        let mut messages_ui = ui.child_ui(messages_rect, egui::Layout::top_down(egui::Align::Min));
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .show(&mut messages_ui, |ui| {
                let content_width = ui.available_width();
                ui.allocate_exact_size(egui::vec2(content_width, 0.0), egui::Sense::hover());
                for bubble in &bubbles {
                    Self::render_bubble(ui, bubble, &persona);
                    ui.add_space(8.0);
                }
                if typing {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(egui::RichText::new(format!("{} is typing…", persona)).italics());
                    });
                }
            });

        ui.add_space(8.0);
        let response = ui.add_sized(
            [ui.available_width(), CHAT_INPUT_HEIGHT],
            egui::TextEdit::multiline(&mut self.draft).hint_text("Type a message (Ctrl+Enter to send)"),
        );
        ui.add_space(8.0);
        let mut send_now = false;
        ui.horizontal(|ui| {
            if ui.button("Send").clicked() {
                send_now = true;
            }
        });
        if response.has_focus() {
            let modifiers = ui.input(|i| i.modifiers);
            if (modifiers.command || modifiers.ctrl) && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send_now = true;
            }
        }
        if send_now {
            self.actions.push(Action::Send);
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_confirm_windows(&mut self, ctx: &egui::Context) {
        if self.sidebar.pending_delete().is_some() {
            let actions = &mut self.actions;
            egui::Window::new("Delete conversation")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label("Delete this conversation? This cannot be undone.");
                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        if ui.button("Delete").clicked() {
                            actions.push(Action::ConfirmDeleteConversation);
                        }
                        if ui.button("Cancel").clicked() {
                            actions.push(Action::CancelDeleteConversation);
                        }
                    });
                });
        }
        if let Some(id) = self.registry.pending_delete() {
            let name = twin::personas::find_by_id(&self.snapshot.personas, id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("#{}", id));
            let actions = &mut self.actions;
            egui::Window::new("Delete persona")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(format!(
                        "Delete {} and all of its conversations? This cannot be undone.",
                        name
                    ));
                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        if ui.button("Delete").clicked() {
                            actions.push(Action::ConfirmDeletePersona);
                        }
                        if ui.button("Cancel").clicked() {
                            actions.push(Action::CancelDeletePersona);
                        }
                    });
                });
        }
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        let available = ui.available_height();
        let scroll_height = (available - Self::SCREEN_FOOTER_SPACING).max(0.0);
        egui::ScrollArea::vertical()
            .max_height(scroll_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace));
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }
}

impl eframe::App for TwinApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_jobs();
        self.refresh_snapshot();
        self.apply_route_guards();
        self.ensure_mounted(ctx);

        let signed_in = self.signed_in();
        let username = self.context.as_ref().and_then(|c| c.session.username());

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    ui.add_space(16.0);
                    ui.horizontal(|ui| {
                        ui.heading("Digital Twin");
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if signed_in {
                                if ui.button("Log out").clicked() {
                                    self.actions.push(Action::Logout);
                                }
                                if let Some(ref name) = username {
                                    ui.label(format!("Signed in as {}", name));
                                }
                            } else {
                                if ui.button("Register").clicked() {
                                    self.actions.push(Action::Goto(Screen::Register));
                                }
                                if ui.button("Log in").clicked() {
                                    self.actions.push(Action::Goto(Screen::Login));
                                }
                            }
                        });
                    });
                    ui.add_space(16.0);
                });
        });

        let current_screen = self.current_screen;
        let actions = &mut self.actions;
        egui::SidePanel::left("nav")
            .resizable(false)
            .exact_width(140.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| {
                        ui.add_space(24.0);
                        for (screen, label) in [
                            (Screen::Home, "Home"),
                            (Screen::Chat, "Chat"),
                            (Screen::Logs, "Logs"),
                        ] {
                            if ui.selectable_label(current_screen == screen, label).clicked() {
                                actions.push(Action::Goto(screen));
                            }
                            ui.add_space(12.0);
                        }
                    });
            });

        if self.current_screen == Screen::Chat {
            egui::SidePanel::right("conversations_panel")
                .resizable(false)
                .exact_width(260.0)
                .show(ctx, |ui| {
                    egui::Frame::none()
                        .inner_margin(egui::Margin::symmetric(16.0, 0.0))
                        .show(ui, |ui| {
                            self.ui_conversation_list(ui);
                        });
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Home => self.ui_home(ui),
                    Screen::Login => self.ui_login(ui),
                    Screen::Register => self.ui_register(ui),
                    Screen::Chat => self.ui_chat(ui),
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });

        self.ui_confirm_windows(ctx);

        for action in std::mem::take(&mut self.actions) {
            self.apply(ctx, action);
        }

        if !self.jobs.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
        let now = Instant::now();
        let success_shown = self
            .snapshot
            .visible_notice(now)
            .is_some_and(|n| n.kind == NoticeKind::Success);
        if self.sidebar.toast(now).is_some() || success_shown {
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }
}
