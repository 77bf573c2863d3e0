use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use twin::api::{Backend, Persona, PersonaQuery, PersonaUpdate};
use twin::context::ClientContext;
use twin::controller::{ChatController, ChatState, NoticeKind, Panel, SendOutcome};
use twin::forms::{LoginForm, PersonaForm, RegisterForm};
use twin::personas::{PersonaAction, PersonaRegistry};
use twin::sidebar::Sidebar;

#[derive(Parser)]
#[command(name = "twin")]
#[command(about = "Digital Twin CLI", long_about = None)]
struct Cli {
    /// Config file path (default: TWIN_CONFIG_PATH or ~/.twin/config.json)
    #[arg(long, short, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config, and the avatars directory.
    Init,

    /// Sign in and store the session.
    Login {
        #[arg(long, short)]
        username: String,

        /// Read from stdin when omitted.
        #[arg(long, short)]
        password: Option<String>,
    },

    /// Create an account (does not sign in).
    Register {
        #[arg(long, short)]
        username: String,

        #[arg(long)]
        full_name: String,

        #[arg(long)]
        email: String,

        /// Read from stdin (twice) when omitted.
        #[arg(long, short)]
        password: Option<String>,
    },

    /// Forget the stored session.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// List, inspect, create, update, and delete personas.
    #[command(subcommand)]
    Personas(PersonaCommand),

    /// List, inspect, and delete conversations.
    #[command(subcommand)]
    Conversations(ConversationCommand),

    /// Chat with personas (interactive). Type /help inside for commands.
    Chat,
}

#[derive(Subcommand)]
enum PersonaCommand {
    List {
        #[arg(long, short)]
        search: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    Show {
        id: i64,
    },
    Create(PersonaArgs),
    /// Change some fields of a persona; the others keep their value.
    Update {
        id: i64,

        #[command(flatten)]
        fields: PersonaUpdateArgs,
    },
    /// Delete a persona and all of its conversations.
    Delete {
        id: i64,

        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Args)]
struct PersonaArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    age: String,
    #[arg(long)]
    location: String,
    #[arg(long)]
    description: String,
    #[arg(long)]
    education: String,
    #[arg(long)]
    tech_skills: String,
    #[arg(long)]
    soft_skills: String,
    #[arg(long)]
    strengths: String,
    #[arg(long)]
    weaknesses: String,
    #[arg(long)]
    goals: String,
    #[arg(long)]
    hobbies: String,
    #[arg(long)]
    personality: String,
    /// Avatar id, e.g. Avatar_3 (`/avatars` in `twin chat` lists them).
    #[arg(long)]
    avatar: Option<String>,
}

impl From<PersonaArgs> for PersonaForm {
    fn from(a: PersonaArgs) -> Self {
        PersonaForm {
            name: a.name,
            age: a.age,
            location: a.location,
            description: a.description,
            education: a.education,
            tech_skills: a.tech_skills,
            soft_skills: a.soft_skills,
            strenghts: a.strengths,
            weaknesses: a.weaknesses,
            goals: a.goals,
            hobbies: a.hobbies,
            personality: a.personality,
            avatar: a.avatar,
        }
    }
}

#[derive(Args)]
struct PersonaUpdateArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=120))]
    age: Option<u32>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    education: Option<String>,
    #[arg(long)]
    tech_skills: Option<String>,
    #[arg(long)]
    soft_skills: Option<String>,
    #[arg(long)]
    strengths: Option<String>,
    #[arg(long)]
    weaknesses: Option<String>,
    #[arg(long)]
    goals: Option<String>,
    #[arg(long)]
    hobbies: Option<String>,
    #[arg(long)]
    personality: Option<String>,
}

impl PersonaUpdateArgs {
    fn into_update(self) -> anyhow::Result<PersonaUpdate> {
        fn text(label: &str, value: Option<String>) -> anyhow::Result<Option<String>> {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if v.is_empty() => anyhow::bail!("{} must not be blank", label),
                other => Ok(other),
            }
        }
        let update = PersonaUpdate {
            name: text("name", self.name)?,
            age: self.age,
            location: text("location", self.location)?,
            description: text("description", self.description)?,
            education: text("education", self.education)?,
            tech_skills: text("tech skills", self.tech_skills)?,
            soft_skills: text("soft skills", self.soft_skills)?,
            strenghts: text("strengths", self.strengths)?,
            weaknesses: text("weaknesses", self.weaknesses)?,
            goals: text("goals", self.goals)?,
            hobbies: text("hobbies", self.hobbies)?,
            personality: text("personality", self.personality)?,
        };
        if update.is_empty() {
            anyhow::bail!("nothing to update; pass at least one field");
        }
        Ok(update)
    }
}

#[derive(Subcommand)]
enum ConversationCommand {
    List,
    Show {
        session_id: String,
    },
    Delete {
        session_id: String,

        #[arg(long, short)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("twin {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init) => run_init(config),
        Some(Commands::Login { username, password }) => run_login(config, username, password).await,
        Some(Commands::Register {
            username,
            full_name,
            email,
            password,
        }) => run_register(config, username, full_name, email, password).await,
        Some(Commands::Logout) => run_logout(config),
        Some(Commands::Whoami) => run_whoami(config),
        Some(Commands::Personas(cmd)) => run_personas(config, cmd).await,
        Some(Commands::Conversations(cmd)) => run_conversations(config, cmd).await,
        Some(Commands::Chat) => run_chat(config).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(twin::config::default_config_path);
    let dir = twin::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn prompt(label: &str) -> anyhow::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", label)?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    let answer = prompt(&format!("{} [y/N] ", question))?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Open the context and require a stored session.
fn signed_in_context(config_path: Option<PathBuf>) -> anyhow::Result<ClientContext> {
    let ctx = ClientContext::open(config_path)?;
    if !ctx.session.is_signed_in() {
        anyhow::bail!("not signed in; run `twin login` first");
    }
    Ok(ctx)
}

async fn run_login(
    config_path: Option<PathBuf>,
    username: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    let ctx = ClientContext::open(config_path)?;
    let password = match password {
        Some(p) => p,
        None => prompt("Password: ")?,
    };
    let form = LoginForm { username, password };
    let session = twin::auth::login(&ctx.client, &ctx.session, &form).await?;
    println!("signed in as {}", session.username);
    Ok(())
}

async fn run_register(
    config_path: Option<PathBuf>,
    username: String,
    full_name: String,
    email: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    let ctx = ClientContext::open(config_path)?;
    let (password, confirm_password) = match password {
        Some(p) => (p.clone(), p),
        None => (prompt("Password: ")?, prompt("Confirm password: ")?),
    };
    let form = RegisterForm {
        username,
        full_name,
        email,
        password,
        confirm_password,
    };
    let user = twin::auth::register(&ctx.client, &form).await?;
    println!("registered {}; run `twin login` to sign in", user.username);
    Ok(())
}

fn run_logout(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = ClientContext::open(config_path)?;
    twin::auth::logout(&ctx.session)?;
    println!("signed out");
    Ok(())
}

fn run_whoami(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = ClientContext::open(config_path)?;
    match ctx.session.get() {
        Some(s) => println!("{} (id {}) at {}", s.username, s.user_id, ctx.client.base_url()),
        None => println!("not signed in"),
    }
    Ok(())
}

async fn run_personas(config_path: Option<PathBuf>, cmd: PersonaCommand) -> anyhow::Result<()> {
    let ctx = signed_in_context(config_path)?;
    match cmd {
        PersonaCommand::List {
            search,
            page,
            limit,
        } => {
            let query = PersonaQuery {
                page,
                limit,
                search,
            };
            let page = ctx.client.list_personas(&query).await?;
            for p in &page.items {
                println!("{:>4}  {}", p.id, p.name);
            }
            println!(
                "page {} ({} of {} personas{})",
                page.page,
                page.items.len(),
                page.total,
                if page.has_next { ", more with --page" } else { "" }
            );
        }
        PersonaCommand::Show { id } => {
            let persona = ctx.client.get_persona(id).await?;
            println!("{}", serde_json::to_string_pretty(&persona)?);
            println!("avatar: {}", ctx.avatars().resolve(&persona).display());
        }
        PersonaCommand::Create(args) => {
            let form = PersonaForm::from(args);
            let payload = form.validate()?;
            let created = ctx.client.create_persona(&payload).await?;
            println!("created persona {} (id {})", created.name, created.id);
        }
        PersonaCommand::Update { id, fields } => {
            let update = fields.into_update()?;
            let updated = ctx.controller().update_persona(id, &update).await?;
            println!("updated persona {} (id {})", updated.name, updated.id);
        }
        PersonaCommand::Delete { id, yes } => {
            let controller = ctx.controller();
            controller.refresh_personas().await;
            let Some(name) = twin::personas::find_by_id(&controller.snapshot().await.personas, id)
                .map(|p| p.name.clone())
            else {
                anyhow::bail!("persona {} not found", id);
            };
            if !yes && !confirm(&format!("Delete persona {} and all of its conversations?", name))? {
                return Ok(());
            }
            let report = controller.delete_persona(id).await;
            println!("{}", report.summary());
            if !report.is_complete() {
                anyhow::bail!("persona deletion incomplete");
            }
        }
    }
    Ok(())
}

async fn run_conversations(config_path: Option<PathBuf>, cmd: ConversationCommand) -> anyhow::Result<()> {
    let ctx = signed_in_context(config_path)?;
    match cmd {
        ConversationCommand::List => {
            let controller = ctx.controller();
            controller.refresh_conversations().await;
            let state = controller.snapshot().await;
            if let Some(ref notice) = state.notice {
                anyhow::bail!("{}", notice.text);
            }
            if state.conversations.is_empty() {
                println!("no conversations");
            }
            for row in &state.conversations {
                println!("{}  {}  {}", row.session_id, Sidebar::caption(row), Sidebar::preview(row));
            }
        }
        ConversationCommand::Show { session_id } => {
            let conversation = ctx.client.get_conversation(&session_id).await?;
            println!("{} with {}", conversation.session_id, conversation.persona);
            for m in conversation.messages.iter().filter(|m| m.role != twin::api::Role::System) {
                println!("[{}] {}", m.role.as_str(), m.content);
            }
        }
        ConversationCommand::Delete { session_id, yes } => {
            if !yes && !confirm(&format!("Delete conversation {}?", session_id))? {
                return Ok(());
            }
            ctx.client.delete_conversation(&session_id).await?;
            println!("Conversation deleted");
        }
    }
    Ok(())
}

const CHAT_HELP: &str = "\
/list                 show conversations
/select <n|session>   open a conversation
/new                  pick a persona for a new chat
/personas             list personas
/pick <n|name>        start a chat with a persona
/create-persona       create a persona (prompts for each field)
/avatars              list available avatar ids
/delete-chat [n]      delete the current (or n-th) conversation
/delete-persona <n>   delete a persona and its conversations
/history              show the current conversation
/quit                 leave
Anything else is sent to the current conversation.";

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = signed_in_context(config_path)?;
    let controller = ctx.controller();
    let mut sidebar = Sidebar::default();
    let mut registry = PersonaRegistry::default();

    controller.mount().await;
    print_status(&controller).await;
    let state = controller.snapshot().await;
    print_conversations(&state);
    print_panel(&state);

    loop {
        let state = controller.snapshot().await;
        if state.login_required {
            anyhow::bail!("session expired; run `twin login` again");
        }
        let label = match state.selected_persona {
            Some(ref p) if state.panel == Panel::ChatActive => format!("{}> ", p),
            _ => "> ".to_string(),
        };
        let mut stdout = io::stdout();
        write!(stdout, "{}", label)?;
        stdout.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let (command, arg) = match input.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (input, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", CHAT_HELP),
            "/list" => {
                controller.refresh_conversations().await;
                print_conversations(&controller.snapshot().await);
            }
            "/select" => match pick_row(&state, arg) {
                Some(session) => {
                    controller.select_conversation(&session).await;
                    print_transcript(&controller.snapshot().await);
                }
                None => println!("no such conversation: {}", arg),
            },
            "/history" => print_transcript(&state),
            "/new" => {
                controller.new_chat().await;
                print_personas(&state);
            }
            "/personas" => print_personas(&state),
            "/avatars" => println!("{}", ctx.avatars().discover().join(", ")),
            "/pick" => match find_persona(&state, arg) {
                Some(p) => match registry.click(&p) {
                    PersonaAction::Select(name) => {
                        println!("starting a chat with {}...", name);
                        controller.pick_persona(&name).await;
                        print_transcript(&controller.snapshot().await);
                    }
                    PersonaAction::RequestDelete(_) => registry.cancel_delete(),
                },
                None => println!("no such persona: {}", arg),
            },
            "/create-persona" => create_persona_interactive(&controller).await?,
            "/delete-chat" => {
                let target = if arg.is_empty() {
                    state.current_session.clone()
                } else {
                    pick_row(&state, arg)
                };
                let Some(session) = target else {
                    println!("no conversation selected");
                    continue;
                };
                sidebar.request_delete(session);
                if confirm("Delete this conversation?")? {
                    if let Some(session) = sidebar.confirm_delete() {
                        if controller.delete_conversation(&session).await.is_ok() {
                            sidebar.deleted(std::time::Instant::now());
                            if let Some(toast) = sidebar.toast(std::time::Instant::now()) {
                                println!("{}", toast.text);
                            }
                        }
                        let state = controller.snapshot().await;
                        print_conversations(&state);
                        print_panel(&state);
                    }
                } else {
                    sidebar.cancel_delete();
                }
            }
            "/delete-persona" => {
                let Some(persona) = find_persona(&state, arg) else {
                    println!("no such persona: {}", arg);
                    continue;
                };
                registry.toggle_delete_mode();
                registry.click(&persona);
                let question = format!("Delete persona {} and all of its conversations?", persona.name);
                if confirm(&question)? {
                    if let Some(id) = registry.confirm_delete() {
                        let report = controller.delete_persona(id).await;
                        log::debug!("persona deletion report: {:?}", report);
                        let state = controller.snapshot().await;
                        print_conversations(&state);
                        print_panel(&state);
                    }
                } else {
                    registry.toggle_delete_mode();
                }
            }
            _ if command.starts_with('/') => println!("unknown command {}; try /help", command),
            _ => match controller.send_message(input).await {
                SendOutcome::Replied(Some(text)) => println!("< {}", text.trim()),
                SendOutcome::Replied(None) => println!("< (no reply)"),
                SendOutcome::Failed(_) => {}
                SendOutcome::Ignored => println!("open a conversation first (/list, /new)"),
            },
        }
        print_status(&controller).await;
    }
    Ok(())
}

/// Resolve a 1-based index or a name against the persona list.
fn find_persona(state: &ChatState, arg: &str) -> Option<Persona> {
    state
        .personas
        .iter()
        .enumerate()
        .find(|(i, p)| arg == (i + 1).to_string() || arg == p.name)
        .map(|(_, p)| p.clone())
}

/// Resolve a 1-based index or a session id against the conversation list.
fn pick_row(state: &ChatState, arg: &str) -> Option<String> {
    if let Ok(n) = arg.parse::<usize>() {
        return state
            .conversations
            .get(n.checked_sub(1)?)
            .map(|c| c.session_id.clone());
    }
    twin::conversations::find(&state.conversations, arg).map(|c| c.session_id.clone())
}

async fn create_persona_interactive(controller: &ChatController) -> anyhow::Result<()> {
    controller.open_persona_create().await;
    let mut form = PersonaForm::default();
    for (label, slot) in form.fields_mut() {
        *slot = prompt(&format!("{}: ", label))?;
    }
    let avatar = prompt("Avatar id (blank for default): ")?;
    form.avatar = Some(avatar);
    let payload = match form.validate() {
        Ok(p) => p,
        Err(e) => {
            println!("{}", e);
            controller.cancel_persona_create().await;
            return Ok(());
        }
    };
    if let Err(e) = controller.submit_persona(&payload).await {
        println!("could not create persona: {}", e);
        controller.cancel_persona_create().await;
    }
    Ok(())
}

async fn print_status(controller: &ChatController) {
    if let Some(notice) = controller.snapshot().await.notice {
        match notice.kind {
            NoticeKind::Success => println!("{}", notice.text),
            NoticeKind::Error => eprintln!("! {}", notice.text),
        }
        controller.dismiss_notice().await;
    }
}

fn print_conversations(state: &ChatState) {
    if state.conversations.is_empty() {
        println!("(no conversations)");
        return;
    }
    for (i, row) in state.conversations.iter().enumerate() {
        let marker = if Sidebar::is_selected(row, state.current_session.as_deref()) {
            '*'
        } else {
            ' '
        };
        println!("{}{:>3}. {}  {}", marker, i + 1, Sidebar::caption(row), Sidebar::preview(row));
    }
}

fn print_personas(state: &ChatState) {
    if state.personas.is_empty() {
        println!("(no personas; /create-persona to add one)");
        return;
    }
    for (i, p) in state.personas.iter().enumerate() {
        println!("{:>3}. {}", i + 1, p.name);
    }
}

fn print_transcript(state: &ChatState) {
    if let Some(row) = state.current() {
        println!("-- {} --", Sidebar::caption(row));
    }
    for bubble in state.transcript.visible() {
        let who = match bubble.message.role {
            twin::api::Role::User => "you",
            _ if bubble.failed => "error",
            _ => state.selected_persona.as_deref().unwrap_or("assistant"),
        };
        println!("[{}] {}", who, bubble.message.content);
    }
}

fn print_panel(state: &ChatState) {
    match state.panel {
        Panel::ChatActive => print_transcript(state),
        Panel::PersonaPicker => {
            println!("pick a persona with /pick <n|name>:");
            print_personas(state);
        }
        Panel::PersonaCreate => println!("creating a persona"),
        Panel::CreatingChat { ref persona } => println!("starting a chat with {}...", persona),
        Panel::Loading => println!("loading..."),
    }
}
