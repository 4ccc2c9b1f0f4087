use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::api::models::canonical_category;
use crate::api::{
    ApiError, ClientOptions, HttpPortalApi, ListQuery, PortalApi, Status, DEFAULT_BASE_URL,
};
use crate::cli::args::{
    BrowseArgs, CliArgs, Command, FilterArgs, ListArgs, LoginArgs, PrioritizeArgs, SubmitArgs,
};
use crate::cli::browse::{self, BrowseCommand};
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::dashboard::{
    Dashboard, DashboardOptions, Filters, ImportanceMap, PagerOptions, SentinelHub, SortOrder,
    StatusFilter, ViewportEvent,
};
use crate::form::{InitiativeDraft, Step};
use crate::output::{self, OutputFormat};
use crate::session::{FileTokenStore, Route, Session};

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("pobude=info"),
        _ => EnvFilter::new("pobude=debug"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn render_custom_help() -> String {
    let cmd = CliArgs::command();
    let mut out = String::new();

    out.push_str(cmd.get_name());
    if let Some(version) = cmd.get_version() {
        out.push(' ');
        out.push_str(version);
    }
    out.push('\n');

    if let Some(about) = cmd.get_about() {
        out.push_str(&about.to_string());
        out.push('\n');
    }

    if let Some(long_about) = cmd.get_long_about() {
        out.push('\n');
        out.push_str(&long_about.to_string());
        out.push('\n');
    }

    out.push('\n');
    out.push_str("Usage: ");
    out.push_str(cmd.get_name());
    out.push_str(" [OPTIONS] <COMMAND>\n\n");

    out.push_str("Commands:\n");
    for sub in cmd.get_subcommands() {
        let about = sub.get_about().map(|a| a.to_string()).unwrap_or_default();
        out.push_str(&format!("  {:<14}{}\n", sub.get_name(), about));
    }
    out.push('\n');

    let mut sections: Vec<(String, Vec<&clap::Arg>)> = Vec::new();
    let mut section_idx: HashMap<String, usize> = HashMap::new();

    for arg in cmd.get_arguments() {
        if arg.is_hide_set() {
            continue;
        }

        let heading = arg.get_help_heading().unwrap_or("Options").to_string();

        let idx = match section_idx.get(&heading).copied() {
            Some(i) => i,
            None => {
                sections.push((heading.clone(), Vec::new()));
                let i = sections.len() - 1;
                section_idx.insert(heading, i);
                i
            }
        };

        sections[idx].1.push(arg);
    }

    for (heading, args) in sections {
        out.push_str(&heading);
        out.push_str(":\n");

        for arg in args {
            let mut parts: Vec<String> = Vec::new();

            if let Some(short) = arg.get_short() {
                parts.push(format!("-{short}"));
            }

            if let Some(long) = arg.get_long() {
                parts.push(format!("--{long}"));
            }

            if let Some(aliases) = arg.get_visible_aliases() {
                for alias in aliases {
                    let rendered = format!("--{alias}");
                    if !parts.iter().any(|p| p == &rendered) {
                        parts.push(rendered);
                    }
                }
            }

            let mut flags = parts.join(", ");

            if arg.get_action().takes_values() {
                let value_name = arg
                    .get_value_names()
                    .and_then(|names| names.first())
                    .map(|name| name.as_str())
                    .unwrap_or("VALUE");
                flags.push_str(&format!(" <{value_name}>"));
            }

            out.push_str("  ");
            out.push_str(&flags);
            out.push('\n');

            if let Some(help) = arg.get_help() {
                let help = help.to_string();
                if !help.trim().is_empty() {
                    out.push_str("          ");
                    out.push_str(help.trim());
                    out.push('\n');
                }
            }

            out.push('\n');
        }
    }

    out
}

struct RunConfig {
    command: Command,
    client: ClientOptions,
    workers: usize,
    token_file: PathBuf,
    output_format: OutputFormat,
    output_path: Option<String>,
    no_color: bool,
    page_size: usize,
    auto_fill_limit: u32,
    full_fetch_status: Option<Status>,
    viewport_rows: usize,
}

/// Flag, then `POBUDE_API_URL`, then the config file, then the built-in URL.
fn resolve_base_url(cli: Option<String>, env: Option<String>, file: Option<String>) -> String {
    cli.or(env)
        .or(file)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let command = args
        .command
        .clone()
        .ok_or_else(|| "no command given, see --help".to_string())?;

    let no_color = if args.color {
        false
    } else {
        args.no_color || cfg.no_color.unwrap_or(false)
    };

    let base_url = resolve_base_url(args.base_url, config::env_base_url(), cfg.base_url);
    let timeout = args.timeout.or(cfg.timeout).unwrap_or(10);
    let proxy = args
        .proxy
        .or(cfg.proxy)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    let workers = args.workers.or(cfg.workers).unwrap_or(2).max(1);

    let token_file = match args.token_file.or(cfg.token_file) {
        Some(path) => config::expand_tilde(&path),
        None => config::default_token_path()
            .ok_or_else(|| "could not determine home directory, pass --token-file".to_string())?,
    };

    let output_path = args.output.map(|p| config::expand_tilde(&p).to_string_lossy().to_string());
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid output format '{raw}', expected text or json"))?,
        None => output_path
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or_default(),
    };

    let browse = match &command {
        Command::Browse(b) => Some(b),
        _ => None,
    };

    let page_size = browse
        .and_then(|b| b.page_size)
        .or(cfg.page_size)
        .unwrap_or(crate::dashboard::pager::DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err("invalid page_size, expected positive integer".to_string());
    }
    let auto_fill_limit = browse
        .and_then(|b| b.auto_fill_limit)
        .or(cfg.auto_fill_limit)
        .unwrap_or(crate::dashboard::scroll::DEFAULT_AUTO_FILL_LIMIT);
    let full_fetch_status = match browse
        .and_then(|b| b.full_fetch_status.clone())
        .or(cfg.full_fetch_status)
    {
        Some(raw) => crate::utils::parse_full_fetch_status(&raw)
            .map_err(|e| format!("invalid full_fetch_status '{raw}': {e}"))?,
        None => Some(Status::Pending),
    };
    let viewport_rows = browse
        .and_then(|b| b.viewport_rows)
        .or(cfg.viewport_rows)
        .unwrap_or(20)
        .max(1);

    Ok(RunConfig {
        command,
        client: ClientOptions {
            base_url,
            timeout_seconds: timeout,
            proxy,
        },
        workers,
        token_file,
        output_format,
        output_path,
        no_color,
        page_size,
        auto_fill_limit,
        full_fetch_status,
        viewport_rows,
    })
}

impl RunConfig {
    fn dashboard_options(&self) -> DashboardOptions {
        DashboardOptions {
            pager: PagerOptions {
                page_size: self.page_size,
                full_fetch_status: self.full_fetch_status,
            },
            auto_fill_limit: self.auto_fill_limit,
        }
    }
}

fn filters_from_args(args: &FilterArgs, default_status: StatusFilter) -> Filters {
    let status = args
        .status
        .as_deref()
        .and_then(StatusFilter::parse)
        .unwrap_or(default_status);
    let category = args
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
        .map(str::to_string);
    let search = args
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Filters {
        status,
        category,
        search,
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::with_template(":: {spinner} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb
}

async fn with_spinner<T>(message: &str, work: impl Future<Output = T>) -> T {
    let pb = spinner(message);
    let out = work.await;
    pb.finish_and_clear();
    out
}

/// Turns an API failure into the one-line CLI message, pointing at `login`
/// when the session was dropped.
fn describe(error: ApiError, session: &Session) -> String {
    if session.take_redirect() == Some(Route::Login) {
        return format!("{error}; run `pobude login` to sign in again");
    }
    error.to_string()
}

/// Prints in the selected format and mirrors the output to `--output`.
async fn emit(run: &RunConfig, render: impl Fn(OutputFormat) -> String) -> Result<(), String> {
    print!("{}", render(run.output_format));
    if let Some(path) = run.output_path.as_deref() {
        let format = output::infer_format_from_path(path).unwrap_or(run.output_format);
        colored::control::set_override(false);
        let contents = render(format);
        if !run.no_color {
            colored::control::unset_override();
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| format!("failed to write output file '{path}': {e}"))?;
        debug!(path, "wrote output file");
    }
    Ok(())
}

async fn cmd_list(run: &RunConfig, api: &HttpPortalApi, list: ListArgs) -> Result<(), String> {
    let filters = filters_from_args(&list.filters, StatusFilter::All);
    let limit = list.limit.unwrap_or(run.page_size);
    let mut query = ListQuery {
        limit: Some(limit),
        offset: Some(list.offset),
        status: filters.status.status(),
        category: filters.category.as_deref().map(canonical_category),
        search: filters.search,
    };

    let pb = spinner("loading initiatives");
    let mut records = Vec::new();
    loop {
        let page = match api.list_initiatives(&query).await {
            Ok(page) => page,
            Err(e) => {
                pb.finish_and_clear();
                return Err(e.to_string());
            }
        };
        let received = page.len();
        records.extend(page);
        if !list.all || received < limit {
            break;
        }
        query.offset = Some(list.offset + records.len());
        pb.set_message(format!("loaded {} initiatives", records.len()));
    }
    pb.finish_and_clear();

    let none = ImportanceMap::new();
    emit(run, |format| match format {
        OutputFormat::Text => output::render_initiatives_text(&records, &none),
        OutputFormat::Json => output::render_json(&records),
    })
    .await
}

async fn cmd_show(run: &RunConfig, api: &HttpPortalApi, id: u64) -> Result<(), String> {
    let record = with_spinner("loading initiative", api.get_initiative(id))
        .await
        .map_err(|e| e.to_string())?;
    emit(run, |format| match format {
        OutputFormat::Text => output::render_initiative_text(&record),
        OutputFormat::Json => output::render_json(&record),
    })
    .await
}

fn step_label(step: Step) -> &'static str {
    match step {
        Step::Location => "location",
        Step::Details => "details",
        Step::Contact => "contact",
        Step::Ready => "review",
    }
}

fn draft_from_args(args: SubmitArgs) -> Result<InitiativeDraft, String> {
    let mut draft = InitiativeDraft::new();
    if let (Some(lat), Some(lon)) = (args.latitude, args.longitude) {
        draft.set_map_point(lat, lon);
    }
    if let (Some(street), Some(number)) = (args.street, args.number) {
        draft.set_address(street, number);
    }
    draft.title = args.title;
    draft.description = args.description;
    draft.category = args.category;
    draft.email = args.email;
    draft.image = args.image.map(|p| config::expand_tilde(&p));

    while draft.step() != Step::Ready {
        let step = draft.step();
        draft
            .advance()
            .map_err(|e| format!("{} step: {e}", step_label(step)))?;
    }
    Ok(draft)
}

async fn cmd_submit(run: &RunConfig, api: &HttpPortalApi, args: SubmitArgs) -> Result<(), String> {
    let request = draft_from_args(args)?
        .into_request()
        .map_err(|e| e.to_string())?;
    let created = with_spinner("submitting initiative", api.create_initiative(&request))
        .await
        .map_err(|e| e.to_string())?;
    emit(run, |format| match format {
        OutputFormat::Text => format!(
            "{} initiative #{} \"{}\"\n",
            "Submitted".green().bold(),
            created.id,
            created.title
        ),
        OutputFormat::Json => output::render_json(&created),
    })
    .await
}

async fn cmd_respond(
    api: &HttpPortalApi,
    session: &Session,
    id: u64,
    text: String,
) -> Result<(), String> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::EmptyField { field: "response" }.to_string());
    }
    let sent = session.authorized(|credential| async move { api.respond(&credential, id, &text).await });
    with_spinner("sending response", sent)
        .await
        .map_err(|e| describe(e, session))?;
    println!("{} initiative #{id}", "Responded to".green().bold());
    Ok(())
}

async fn cmd_stats(run: &RunConfig, api: &HttpPortalApi, session: &Session) -> Result<(), String> {
    let load = session.authorized(|credential| async move { api.admin_statistics(&credential).await });
    let stats = with_spinner("loading statistics", load)
        .await
        .map_err(|e| describe(e, session))?;
    emit(run, |format| match format {
        OutputFormat::Text => output::render_statistics_text(&stats),
        OutputFormat::Json => output::render_json(&stats),
    })
    .await
}

async fn cmd_public_stats(run: &RunConfig, api: &HttpPortalApi) -> Result<(), String> {
    let stats = with_spinner("loading statistics", api.public_statistics())
        .await
        .map_err(|e| e.to_string())?;
    emit(run, |format| match format {
        OutputFormat::Text => output::render_public_statistics_text(&stats),
        OutputFormat::Json => output::render_json(&stats),
    })
    .await
}

async fn cmd_streets(
    run: &RunConfig,
    api: &HttpPortalApi,
    query: String,
    limit: usize,
) -> Result<(), String> {
    let streets = api
        .search_streets(query.trim(), limit)
        .await
        .map_err(|e| e.to_string())?;
    emit(run, |format| match format {
        OutputFormat::Text => output::render_streets_text(&streets),
        OutputFormat::Json => output::render_json(&streets),
    })
    .await
}

async fn cmd_prioritize(
    run: &RunConfig,
    api: Arc<HttpPortalApi>,
    session: Arc<Session>,
    args: PrioritizeArgs,
) -> Result<(), String> {
    let filters = filters_from_args(&args.filters, StatusFilter::Only(Status::Pending));
    let dashboard = Dashboard::new(api, session.clone(), run.dashboard_options(), filters);
    with_spinner("loading initiatives", dashboard.mount())
        .await
        .map_err(|e| describe(e, &session))?;

    if args.random {
        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        dashboard.prioritize_random(&mut rng);
    } else {
        with_spinner("scoring initiatives", dashboard.prioritize_remote())
            .await
            .map_err(|e| describe(e, &session))?;
    }
    dashboard.set_sort_order(if args.ascending {
        SortOrder::Ascending
    } else {
        SortOrder::Descending
    });

    let view = dashboard.view();
    emit(run, |format| match format {
        OutputFormat::Text => output::render_initiatives_text(&view.records, &view.importance),
        OutputFormat::Json => output::render_json(&output::scored(&view.records, &view.importance)),
    })
    .await
}

async fn read_line(prompt: &str) -> Result<String, String> {
    eprint!("{prompt}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await {
        Ok(Some(line)) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
        Ok(None) => Err("no input on stdin".to_string()),
        Err(e) => Err(format!("failed to read stdin: {e}")),
    }
}

async fn cmd_login(
    run: &RunConfig,
    api: &HttpPortalApi,
    session: &Session,
    args: LoginArgs,
) -> Result<(), String> {
    let password = match args.password {
        Some(p) => p,
        None => read_line("Password: ").await?,
    };
    with_spinner("logging in", session.login(api, &args.username, &password))
        .await
        .map_err(|e| match e {
            ApiError::Unauthorized { .. } => "invalid username or password".to_string(),
            other => other.to_string(),
        })?;
    let _ = session.take_redirect();
    println!(
        "{} as {} (token stored in {})",
        "Logged in".green().bold(),
        args.username,
        run.token_file.display()
    );
    Ok(())
}

async fn apply_browse_command(
    dashboard: &Dashboard<HttpPortalApi>,
    command: BrowseCommand,
) -> Result<(), ApiError> {
    match command {
        BrowseCommand::Status(status) => {
            with_spinner("loading", dashboard.set_status_filter(status)).await?;
        }
        BrowseCommand::Category(category) => {
            with_spinner("loading", dashboard.set_category(category)).await?;
        }
        BrowseCommand::Search(term) => {
            with_spinner("loading", dashboard.set_search(term)).await?;
        }
        BrowseCommand::RandomPriority => {
            dashboard.prioritize_random(&mut StdRng::from_entropy());
        }
        BrowseCommand::RemotePriority => {
            with_spinner("scoring", dashboard.prioritize_remote()).await?;
        }
        BrowseCommand::Sort(order) => dashboard.set_sort_order(order),
        BrowseCommand::Respond { id, text } => {
            with_spinner("sending response", dashboard.respond(id, &text)).await?;
            println!("{} initiative #{id}", "Responded to".green().bold());
        }
        BrowseCommand::More | BrowseCommand::Help | BrowseCommand::Quit => {}
    }
    Ok(())
}

fn redraw(dashboard: &Dashboard<HttpPortalApi>, hub: &SentinelHub, rows: usize) {
    let view = dashboard.view();
    print!("{}", output::render_dashboard(&view));
    if !view.in_flight {
        hub.notify(ViewportEvent::Layout {
            scrollable: view.records.len() > rows,
        });
    }
}

async fn cmd_browse(
    run: &RunConfig,
    api: Arc<HttpPortalApi>,
    session: Arc<Session>,
    args: BrowseArgs,
) -> Result<(), String> {
    if !session.is_authenticated() {
        return Err("not logged in, run `pobude login` first".to_string());
    }
    let filters = filters_from_args(&args.filters, StatusFilter::Only(Status::Pending));
    let dashboard = Dashboard::new(api, session.clone(), run.dashboard_options(), filters);
    let hub = SentinelHub::new();
    let rows = run.viewport_rows;

    let viewport = dashboard.run(&hub, |event, outcome| match outcome {
        Some(_) => redraw(&dashboard, &hub, rows),
        None if event == ViewportEvent::SentinelVisible => {
            if let Some(error) = dashboard.error_message() {
                eprintln!("{} {error}", "error:".red().bold());
            } else {
                println!("{}", "-- nothing more to load --".dimmed());
            }
        }
        None => {}
    });

    let input = async {
        if let Err(e) = with_spinner("loading", dashboard.mount()).await {
            warn!(error = %e, "initial load failed");
        }
        redraw(&dashboard, &hub, rows);
        println!("{}", "h for help".dimmed());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match browse::parse_line(&line) {
                Ok(BrowseCommand::Quit) => break,
                Ok(BrowseCommand::Help) => println!("{}", browse::HELP),
                Ok(BrowseCommand::More) => {
                    hub.notify(ViewportEvent::SentinelVisible);
                }
                Ok(command) => match apply_browse_command(&dashboard, command).await {
                    Ok(()) => redraw(&dashboard, &hub, rows),
                    Err(e) => eprintln!("{} {e}", "error:".red().bold()),
                },
                Err(e) => eprintln!("{e}"),
            }
            if session.take_redirect() == Some(Route::Login) {
                eprintln!("session expired, run `pobude login` to sign in again");
                break;
            }
        }
        dashboard.teardown();
        hub.close();
    };

    tokio::join!(viewport, input);
    Ok(())
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }

    let api = Arc::new(HttpPortalApi::new(&run.client).map_err(|e| e.to_string())?);
    let session = Arc::new(Session::new(FileTokenStore::new(run.token_file.clone())));
    debug!(base_url = api.base_url(), "client ready");

    match run.command.clone() {
        Command::List(list) => cmd_list(&run, &api, list).await,
        Command::Show { id } => cmd_show(&run, &api, id).await,
        Command::Submit(args) => cmd_submit(&run, &api, args).await,
        Command::Respond { id, text } => cmd_respond(&api, &session, id, text).await,
        Command::Stats => cmd_stats(&run, &api, &session).await,
        Command::PublicStats => cmd_public_stats(&run, &api).await,
        Command::Streets { query, limit } => cmd_streets(&run, &api, query, limit).await,
        Command::Prioritize(args) => cmd_prioritize(&run, api, session, args).await,
        Command::Login(args) => cmd_login(&run, &api, &session, args).await,
        Command::Logout => {
            session.logout();
            println!("Logged out.");
            Ok(())
        }
        Command::Browse(args) => cmd_browse(&run, api, session, args).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<(), String> {
    let path = path
        .or_else(config::default_config_path)
        .ok_or_else(|| "could not determine home directory, pass --config".to_string())?;
    if force && path.exists() {
        std::fs::remove_file(&path)
            .map_err(|e| format!("failed to replace config '{}': {e}", path.display()))?;
    }
    if config::ensure_default_config_file(&path)? {
        println!("Wrote {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", render_custom_help());
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    init_tracing(args.verbose);

    let user_config_path = args.config.clone().map(|p| config::expand_tilde(&p));
    if let Some(Command::InitConfig { force }) = args.command {
        return init_config(user_config_path, force);
    }
    if args.command.is_none() {
        print!("{}", render_custom_help());
        return Ok(());
    }

    let cfg = match user_config_path.as_ref() {
        Some(path) => config::load_config(path, false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(run.workers)
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_apply_without_config() {
        let args = CliArgs::parse_from(["pobude", "--token-file", "/tmp/t", "browse"]);
        let run = build_run_config(args, ConfigFile::default()).unwrap();
        assert_eq!(run.page_size, 20);
        assert_eq!(run.auto_fill_limit, 2);
        assert_eq!(run.full_fetch_status, Some(Status::Pending));
        assert_eq!(run.viewport_rows, 20);
        assert_eq!(run.output_format, OutputFormat::Text);
        assert_eq!(run.client.timeout_seconds, 10);
    }

    #[test]
    fn flags_override_config_file() {
        let cfg = ConfigFile {
            page_size: Some(50),
            auto_fill_limit: Some(5),
            full_fetch_status: Some("none".to_string()),
            timeout: Some(30),
            ..ConfigFile::default()
        };
        let args = CliArgs::parse_from([
            "pobude",
            "--token-file",
            "/tmp/t",
            "-T",
            "3",
            "browse",
            "--page-size",
            "10",
        ]);
        let run = build_run_config(args, cfg).unwrap();
        assert_eq!(run.page_size, 10);
        assert_eq!(run.auto_fill_limit, 5);
        assert_eq!(run.full_fetch_status, None);
        assert_eq!(run.client.timeout_seconds, 3);
    }

    #[test]
    fn output_format_is_inferred_from_output_path() {
        let args = CliArgs::parse_from(["pobude", "--token-file", "/tmp/t", "-o", "out.json", "stats"]);
        let run = build_run_config(args, ConfigFile::default()).unwrap();
        assert_eq!(run.output_format, OutputFormat::Json);
    }

    #[test]
    fn base_url_precedence() {
        let some = |s: &str| Some(s.to_string());
        assert_eq!(
            resolve_base_url(some("http://cli/api"), some("http://env/api"), some("http://file/api")),
            "http://cli/api"
        );
        assert_eq!(
            resolve_base_url(None, some("http://env/api"), some("http://file/api")),
            "http://env/api"
        );
        assert_eq!(resolve_base_url(None, None, some("http://file/api")), "http://file/api");
        assert_eq!(resolve_base_url(None, None, None), DEFAULT_BASE_URL);
    }

    #[test]
    fn invalid_full_fetch_status_in_config_is_rejected() {
        let cfg = ConfigFile {
            full_fetch_status: Some("archived".to_string()),
            ..ConfigFile::default()
        };
        let args = CliArgs::parse_from(["pobude", "--token-file", "/tmp/t", "list"]);
        assert!(build_run_config(args, cfg).is_err());
    }

    #[test]
    fn submit_flags_become_a_request() {
        let args = CliArgs::parse_from([
            "pobude",
            "submit",
            "--title",
            "Razbita svetilka",
            "--description",
            "Svetilka ob poti ne sveti že teden dni.",
            "--email",
            "janez@example.si",
            "--street",
            "Trubarjeva cesta",
            "--number",
            "5",
        ]);
        let Some(Command::Submit(submit)) = args.command else {
            panic!("expected submit");
        };
        let request = draft_from_args(submit).unwrap().into_request().unwrap();
        assert_eq!(request.location, "Trubarjeva cesta 5, Ljubljana");
    }

    #[test]
    fn submit_reports_failing_step() {
        let args = CliArgs::parse_from([
            "pobude",
            "submit",
            "--title",
            "ok title",
            "--description",
            "short",
            "--email",
            "janez@example.si",
            "--lat",
            "46.05",
            "--lon",
            "14.5",
        ]);
        let Some(Command::Submit(submit)) = args.command else {
            panic!("expected submit");
        };
        assert!(draft_from_args(submit).unwrap_err().starts_with("details step"));
    }

    #[test]
    fn help_lists_subcommands() {
        let help = render_custom_help();
        assert!(help.contains("browse"));
        assert!(help.contains("init-config"));
        assert!(help.contains("--config"));
    }
}
