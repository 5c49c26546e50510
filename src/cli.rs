use std::error::Error;
use std::io::{self, BufRead, Write};
#[cfg(feature = "web")]
use std::net::SocketAddr;

use atty::Stream;
use clap::{Parser, Subcommand};
use placename_rs::config::DEFAULT_ENDPOINT;
use placename_rs::format::{self, PanelContent, SummaryView};
use placename_rs::paging::DEFAULT_PAGE_SIZE;
use placename_rs::search::{ResultOrigin, ResultSet};
use placename_rs::{
    Browser, BrowserConfig, DisplayMode, HttpDirectory, IntentOutcome, LocationSummary,
    PageSizeChange, SearchForm, SearchMode, SessionView, StatusKind, StatusLine, StepDirection,
};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

type CliBrowser = Browser<HttpDirectory>;

#[derive(Parser, Debug)]
#[command(name = "placename-rs", about = "Browse the historical place-name registry", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the registry gateway.
    #[arg(long, global = true, env = "PLACENAME_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Request timeout in seconds. Requests are unbounded by default.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Results per page.
    #[arg(long, global = true, default_value_t = DEFAULT_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    page_size: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search place names by name, year and feature type.
    Search {
        /// Substring of the place name.
        #[arg(long)]
        name: Option<String>,
        /// Year the place name was in use; negative years are BC.
        #[arg(long, allow_hyphen_values = true)]
        year: Option<i32>,
        /// Feature-type filter.
        #[arg(long = "type")]
        kind: Option<String>,
        /// 1-based page to show.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
        /// Results per page; overrides --page-size.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        limit: Option<u32>,
    },
    /// Show one entry by sysId.
    Show {
        /// sysId of the entry.
        sys_id: String,
        /// Display mode: summary, source or raw.
        #[arg(long, default_value = "summary")]
        mode: DisplayMode,
    },
    /// Start an interactive browsing session on stdin.
    Browse,
    /// Serve the session over a JSON HTTP API.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = BrowserConfig {
        endpoint: cli.endpoint.clone(),
        default_page_size: cli.page_size,
        timeout_secs: cli.timeout,
    };
    match cli.command {
        Command::Search {
            name,
            year,
            kind,
            page,
            limit,
        } => {
            let config = BrowserConfig {
                default_page_size: limit.unwrap_or(config.default_page_size),
                ..config
            };
            let form = SearchForm {
                name,
                year: year.map(|year| year.to_string()),
                kind,
                sys_id: None,
            };
            let browser = connect(config)?;
            runtime()?.block_on(handle_search(&browser, form, page, cli.json))
        }
        Command::Show { sys_id, mode } => {
            let browser = connect(config)?;
            runtime()?.block_on(handle_show(&browser, sys_id, mode, cli.json))
        }
        Command::Browse => {
            let browser = connect(config)?;
            handle_browse(&browser, &runtime()?, cli.json)
        }
        #[cfg(feature = "web")]
        Command::Serve { addr } => handle_serve(addr, config),
    }
}

fn init_tracing() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("placename_rs=info".parse()?))
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn runtime() -> io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn connect(config: BrowserConfig) -> Result<CliBrowser, Box<dyn Error>> {
    let directory = HttpDirectory::new(&config)?;
    Ok(Browser::new(directory, config))
}

async fn handle_search(
    browser: &CliBrowser,
    form: SearchForm,
    page: u32,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    browser.submit_search(form).await?;
    if page > 1 {
        let outcome = browser.change_page(i64::from(page - 1)).await?;
        if outcome == IntentOutcome::Ignored {
            let last = browser.snapshot().pagination.page_count;
            return Err(format!("Page {page} is out of range (last page is {last})").into());
        }
    }

    let session = browser.snapshot();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        print_results_table(&session.results, &[]);
        print_page_info(&session);
    }
    Ok(())
}

async fn handle_show(
    browser: &CliBrowser,
    sys_id: String,
    mode: DisplayMode,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    browser.follow_relation(&sys_id).await?;
    browser.change_display_mode(mode);
    let panel = browser
        .panel()
        .ok_or_else(|| format!("No detail available for sysId {sys_id:?}"))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&panel)?);
    } else {
        print_panel(&panel);
    }
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(addr: SocketAddr, config: BrowserConfig) -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(placename_rs::web::serve(placename_rs::web::WebConfig {
        addr,
        browser: config,
    }))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SizeEdit {
    Step(StepDirection),
    Typed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Search(SearchForm),
    Lookup(String),
    Mode(SearchMode),
    Select {
        target: String,
        mode: Option<DisplayMode>,
    },
    View(DisplayMode),
    Page(i64),
    Size(SizeEdit),
    Follow(String),
    Locations,
    Show,
    Help,
    Quit,
}

fn handle_browse(browser: &CliBrowser, runtime: &Runtime, as_json: bool) -> Result<(), Box<dyn Error>> {
    let interactive = atty::is(Stream::Stdin);
    if interactive {
        println!("Type `help` for commands, `quit` to leave.");
    }
    let stdin = io::stdin();
    loop {
        if interactive {
            print!("{}> ", browser.snapshot().search_mode);
            io::stdout().flush()?;
        }
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match parse_repl_command(line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        match command {
            ReplCommand::Quit => break,
            ReplCommand::Help => {
                print_repl_help();
                continue;
            }
            ReplCommand::Locations => runtime.block_on(print_locations(browser, as_json))?,
            command => {
                if let Err(err) = runtime.block_on(apply_command(browser, command)) {
                    eprintln!("error: {err}");
                }
                print_session(browser, as_json)?;
            }
        }
    }
    Ok(())
}

fn parse_repl_command(line: &str) -> Result<ReplCommand, String> {
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default().to_ascii_lowercase();
    let rest: Vec<&str> = parts.collect();
    let first = || {
        rest.first()
            .map(|value| value.to_string())
            .ok_or_else(|| format!("`{head}` needs an argument; type `help`"))
    };

    match head.as_str() {
        "search" | "s" => Ok(ReplCommand::Search(parse_search_form(&rest))),
        "lookup" | "id" => first().map(ReplCommand::Lookup),
        "mode" => first()?.parse().map(ReplCommand::Mode),
        "select" | "open" => {
            let target = first()?;
            let mode = rest.get(1).map(|raw| raw.parse::<DisplayMode>()).transpose()?;
            Ok(ReplCommand::Select { target, mode })
        }
        "view" => first()?.parse().map(ReplCommand::View),
        "next" | "n" => Ok(ReplCommand::Page(1)),
        "prev" | "p" => Ok(ReplCommand::Page(-1)),
        "page" => first()?
            .parse::<i64>()
            .map(ReplCommand::Page)
            .map_err(|_| "usage: page <delta>".to_string()),
        "size" => match first()?.as_str() {
            "+" => Ok(ReplCommand::Size(SizeEdit::Step(StepDirection::Increase))),
            "-" => Ok(ReplCommand::Size(SizeEdit::Step(StepDirection::Decrease))),
            raw => Ok(ReplCommand::Size(SizeEdit::Typed(raw.to_string()))),
        },
        "follow" => first().map(ReplCommand::Follow),
        "locations" | "loc" => Ok(ReplCommand::Locations),
        "show" => Ok(ReplCommand::Show),
        "help" | "?" => Ok(ReplCommand::Help),
        "quit" | "exit" | "q" => Ok(ReplCommand::Quit),
        other => Err(format!("Unknown command {other:?}; type `help`")),
    }
}

/// `key=value` tokens set name, year or type; bare words form the name.
fn parse_search_form(tokens: &[&str]) -> SearchForm {
    let mut form = SearchForm::default();
    let mut bare = Vec::new();
    for token in tokens {
        match token.split_once('=') {
            Some(("name", value)) => form.name = Some(value.to_string()),
            Some(("year", value)) => form.year = Some(value.to_string()),
            Some(("type", value)) => form.kind = Some(value.to_string()),
            _ => bare.push(*token),
        }
    }
    if form.name.is_none() && !bare.is_empty() {
        form.name = Some(bare.join(" "));
    }
    form
}

async fn apply_command(browser: &CliBrowser, command: ReplCommand) -> placename_rs::Result<()> {
    match command {
        ReplCommand::Search(form) => {
            browser.switch_search_mode(SearchMode::Criteria);
            browser.submit_search(form).await?;
        }
        ReplCommand::Lookup(sys_id) => {
            browser.switch_search_mode(SearchMode::Direct);
            let form = SearchForm {
                sys_id: Some(sys_id),
                ..SearchForm::default()
            };
            browser.submit_search(form).await?;
        }
        ReplCommand::Mode(mode) => {
            browser.switch_search_mode(mode);
        }
        ReplCommand::Select { target, mode } => {
            let session = browser.snapshot();
            let sys_id = resolve_row(&session.results, &target);
            let mode = mode.unwrap_or(session.detail.mode);
            browser.select_by_id(&sys_id, mode).await?;
        }
        ReplCommand::View(mode) => browser.change_display_mode(mode),
        ReplCommand::Page(delta) => {
            if browser.change_page(delta).await? == IntentOutcome::Ignored {
                println!("No such page.");
            }
        }
        ReplCommand::Size(edit) => {
            let current = browser.snapshot().pagination.page_size;
            let (raw, stepper) = match edit {
                SizeEdit::Step(StepDirection::Increase) => ((current + 1).to_string(), true),
                SizeEdit::Step(StepDirection::Decrease) => {
                    (current.saturating_sub(1).max(1).to_string(), true)
                }
                SizeEdit::Typed(raw) => (raw, false),
            };
            let update = browser.change_page_size(&raw, stepper).await?;
            if let PageSizeChange::Rejected { revert_to } = update.change {
                println!("Invalid page size {raw:?}; keeping {revert_to}.");
            }
        }
        ReplCommand::Follow(sys_id) => {
            browser.follow_relation(&sys_id).await?;
        }
        ReplCommand::Locations | ReplCommand::Show | ReplCommand::Help | ReplCommand::Quit => {}
    }
    Ok(())
}

/// A 1-based row number of the current results, or a sysId as typed.
fn resolve_row(results: &ResultSet, target: &str) -> String {
    target
        .parse::<usize>()
        .ok()
        .and_then(|row| row.checked_sub(1))
        .and_then(|index| results.records.get(index))
        .and_then(|record| record.key())
        .map(str::to_string)
        .unwrap_or_else(|| target.to_string())
}

async fn print_locations(browser: &CliBrowser, as_json: bool) -> Result<(), Box<dyn Error>> {
    let results = browser.snapshot().results;
    let mut locations = Vec::with_capacity(results.records.len());
    for record in &results.records {
        let text = match browser.location_summary(record).await {
            LocationSummary::Known(text) => text,
            LocationSummary::Unknown => "unknown".to_string(),
            LocationSummary::Superseded => return Ok(()),
        };
        locations.push(text);
    }

    if as_json {
        let payload: Vec<_> = results
            .records
            .iter()
            .zip(&locations)
            .map(|(record, location)| json!({ "sysId": record.key(), "location": location }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_results_table(&results, &locations);
    }
    Ok(())
}

fn print_repl_help() {
    println!("search [name] [name=..] [year=..] [type=..]   criteria search");
    println!("lookup <sysId>                               direct lookup");
    println!("mode criteria|direct                         switch search mode");
    println!("select <row|sysId> [summary|source|raw]      open a result");
    println!("view summary|source|raw                      change display mode");
    println!("next | prev | page <delta>                   move through pages");
    println!("size + | size - | size <n>                   change page size");
    println!("follow <sysId>                               open a related entry");
    println!("locations                                    fetch present-day locations");
    println!("show | help | quit");
}

fn print_session(browser: &CliBrowser, as_json: bool) -> Result<(), Box<dyn Error>> {
    let session = browser.snapshot();
    let panel = browser.panel();
    if as_json {
        let payload = json!({ "session": session, "panel": panel });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    print_results_table(&session.results, &[]);
    print_page_info(&session);
    match (&session.detail.loading, &panel) {
        (Some(sys_id), _) => println!("\nLoading {sys_id}…"),
        (None, Some(panel)) => print_panel(panel),
        (None, None) => {}
    }
    if let Some(status) = &session.status {
        print_status(status);
    }
    Ok(())
}

fn print_results_table(results: &ResultSet, locations: &[String]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    let headers = ["#", "SYS_ID", "NAME", "LOCATION", "TYPE", "PERIOD"];
    let rows: Vec<[String; 6]> = results
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let location = locations
                .get(index)
                .cloned()
                .or_else(|| format::location_summary(record, None))
                .unwrap_or_else(|| format::PLACEHOLDER.to_string());
            [
                (index + 1).to_string(),
                record.key().unwrap_or("<missing>").to_string(),
                format::primary_name(record, None),
                location,
                format::feature_type_label(record),
                format::format_period(record.temporal.as_ref()),
            ]
        })
        .collect();
    let widths: Vec<usize> = (0..headers.len())
        .map(|column| {
            rows.iter()
                .map(|row| row[column].chars().count())
                .max()
                .unwrap_or(0)
                .max(headers[column].len())
        })
        .collect();

    print_row(&headers.map(str::to_string), &widths);
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    println!("{}", rule.join("  "));
    for row in &rows {
        print_row(row, &widths);
    }
}

fn print_row(cells: &[String], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", line.trim_end());
}

fn print_page_info(session: &SessionView) {
    if session.results.origin != ResultOrigin::Criteria {
        return;
    }
    let pagination = session.pagination;
    println!(
        "Page {} of {} · {} result(s) · {} per page",
        session.display_page,
        pagination.page_count.max(1),
        pagination.total,
        pagination.page_size
    );
}

fn print_status(status: &StatusLine) {
    let label = match status.kind {
        StatusKind::Info => "info",
        StatusKind::Error => "error",
        StatusKind::Success => "ok",
    };
    println!("\n[{label}] {}", status.message);
}

fn print_panel(panel: &PanelContent) {
    match panel {
        PanelContent::Summary(summary) => print_summary(summary),
        PanelContent::SourceNote(Some(text)) => render_markdown_block("Source Note", text),
        PanelContent::SourceNote(None) => println!("\nSource Note: no data."),
        PanelContent::Raw(raw) => {
            println!("\nRaw Record:");
            println!("{raw}");
        }
    }
}

fn print_summary(summary: &SummaryView) {
    println!("\n{}", summary.title);
    if let Some(sys_id) = &summary.sys_id {
        println!("sysId: {sys_id}");
    }
    println!("Type: {}", summary.feature_type);
    println!("Period: {}", summary.period);
    let meta = [
        ("Review", &summary.review_status),
        ("Data source", &summary.data_source),
        ("Spatial source", &summary.spatial_source),
        ("License", &summary.license),
        ("Source URI", &summary.source_uri),
        ("Rejected", &summary.rejection_reason),
        ("Disabled", &summary.disabled_reason),
    ];
    for (label, value) in meta {
        if let Some(value) = value {
            println!("{label}: {value}");
        }
    }
    println!(
        "Names: {} / {} / {}",
        summary.names.simplified, summary.names.traditional, summary.names.romanized
    );
    if let Some(locations) = format_list(summary.locations.iter().map(String::as_str).collect(), 6) {
        println!("Present locations: {locations}");
    }
    if let Some(coordinates) = &summary.coordinates {
        println!("Coordinates: {coordinates}");
    }

    for section in &summary.relations {
        if section.entries.is_empty() {
            continue;
        }
        println!("\n{}:", section.title);
        for entry in &section.entries {
            match &entry.sys_id {
                Some(sys_id) => println!("- {} [{sys_id}]", entry.label),
                None => println!("- {}", entry.label),
            }
        }
    }
}

fn format_list(items: Vec<&str>, limit: usize) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let truncated = items.len() > limit;
    let display = if truncated {
        &items[..limit]
    } else {
        &items[..]
    };
    let mut text = display.join(", ");
    if truncated {
        text.push_str(", …");
    }
    Some(text)
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
