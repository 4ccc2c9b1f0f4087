use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pobude",
    version,
    about = "citizen initiatives portal client",
    long_about = "Pobude is a terminal client for the citizen initiatives portal: submit initiatives, browse and answer them as an administrator, and inspect statistics.\n\nExamples:\n  pobude list --status pending\n  pobude login -U admin\n  pobude browse --status all\n  pobude --config ~/.pobude/config.yml stats\n\nTip: run `pobude init-config` once and keep the backend URL in the config file."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'c',
        long = "color",
        global = true,
        help_heading = "Output",
        help = "Enable colored output (overrides --no-color)."
    )]
    pub color: bool,

    #[arg(
        long = "no-color",
        visible_alias = "nc",
        global = true,
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'f',
        long = "format",
        visible_alias = "output-format",
        value_name = "FORMAT",
        global = true,
        help_heading = "Output",
        help = "Output format: text or json."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        global = true,
        help_heading = "Output",
        help = "Also write results to a file (format inferred from .json/.txt)."
    )]
    pub output: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        visible_alias = "cfg",
        value_name = "FILE",
        global = true,
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.pobude/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'u',
        long = "url",
        visible_alias = "api-url",
        value_name = "URL",
        global = true,
        help_heading = "HTTP",
        help = "Backend API base URL (overrides POBUDE_API_URL and the config file)."
    )]
    pub base_url: Option<String>,

    #[arg(
        short = 'T',
        long = "timeout",
        value_name = "SECONDS",
        global = true,
        help_heading = "HTTP",
        help = "Per-request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'p',
        long = "proxy",
        visible_alias = "px",
        value_name = "URL",
        global = true,
        help_heading = "HTTP",
        help = "HTTP proxy URL (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'w',
        long = "workers",
        value_name = "N",
        global = true,
        help_heading = "Performance",
        help = "Number of runtime worker threads."
    )]
    pub workers: Option<usize>,

    #[arg(
        long = "token-file",
        value_name = "FILE",
        global = true,
        help_heading = "Session",
        help = "Where the admin token is stored (defaults to ~/.pobude/token)."
    )]
    pub token_file: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List initiatives (one page, or every page with --all).
    List(ListArgs),
    /// Show a single initiative.
    Show {
        #[arg(value_name = "ID")]
        id: u64,
    },
    /// Submit a new initiative.
    Submit(SubmitArgs),
    /// Answer an initiative (admin).
    Respond {
        #[arg(value_name = "ID")]
        id: u64,
        #[arg(value_name = "TEXT")]
        text: String,
    },
    /// Admin statistics for the last 30 days.
    Stats,
    /// Public statistics.
    PublicStats,
    /// Search Ljubljana street names.
    Streets {
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(short = 'l', long = "limit", default_value_t = 10, value_name = "N")]
        limit: usize,
    },
    /// Score listed initiatives by priority (admin).
    Prioritize(PrioritizeArgs),
    /// Log in as administrator and store the token.
    Login(LoginArgs),
    /// Forget the stored token.
    Logout,
    /// Interactive admin dashboard with incremental loading.
    Browse(BrowseArgs),
    /// Write the default config file.
    InitConfig {
        #[arg(long = "force", help = "Overwrite an existing file.")]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(
        short = 's',
        long = "status",
        value_name = "STATUS",
        help = "pending, responded or all."
    )]
    pub status: Option<String>,

    #[arg(long = "category", visible_alias = "cat", value_name = "CATEGORY")]
    pub category: Option<String>,

    #[arg(short = 'q', long = "search", value_name = "TERM")]
    pub search: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[arg(long = "limit", value_name = "N", help = "Page size.")]
    pub limit: Option<usize>,

    #[arg(long = "offset", value_name = "N", default_value_t = 0)]
    pub offset: usize,

    #[arg(short = 'a', long = "all", help = "Follow pages until the listing is exhausted.")]
    pub all: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    #[arg(long = "title", value_name = "TEXT")]
    pub title: String,

    #[arg(long = "description", visible_alias = "desc", value_name = "TEXT")]
    pub description: String,

    #[arg(long = "email", value_name = "ADDRESS")]
    pub email: String,

    #[arg(long = "street", value_name = "NAME", requires = "number")]
    pub street: Option<String>,

    #[arg(long = "number", value_name = "HOUSE_NUMBER", requires = "street")]
    pub number: Option<String>,

    #[arg(
        long = "lat",
        value_name = "LATITUDE",
        allow_negative_numbers = true,
        help = "Map point latitude; with --lon selects a map location."
    )]
    pub latitude: Option<f64>,

    #[arg(long = "lon", value_name = "LONGITUDE", allow_negative_numbers = true)]
    pub longitude: Option<f64>,

    #[arg(long = "category", visible_alias = "cat", value_name = "CATEGORY")]
    pub category: Option<String>,

    #[arg(long = "image", value_name = "FILE")]
    pub image: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PrioritizeArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[arg(
        long = "random",
        help = "Assign random scores locally instead of asking the backend."
    )]
    pub random: bool,

    #[arg(long = "seed", value_name = "N", requires = "random")]
    pub seed: Option<u64>,

    #[arg(long = "asc", help = "Lowest priority first.")]
    pub ascending: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    #[arg(short = 'U', long = "username", value_name = "NAME")]
    pub username: String,

    #[arg(
        short = 'P',
        long = "password",
        value_name = "PASSWORD",
        help = "Read from stdin when omitted."
    )]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[arg(long = "page-size", value_name = "N", help_heading = "Dashboard")]
    pub page_size: Option<usize>,

    #[arg(long = "auto-fill-limit", value_name = "N", help_heading = "Dashboard")]
    pub auto_fill_limit: Option<u32>,

    #[arg(
        long = "full-fetch-status",
        value_name = "STATUS",
        help_heading = "Dashboard",
        help = "Status listed unpaginated in one request (or none)."
    )]
    pub full_fetch_status: Option<String>,

    #[arg(long = "rows", visible_alias = "viewport-rows", value_name = "N", help_heading = "Dashboard")]
    pub viewport_rows: Option<usize>,
}
