use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "vendr",
    version,
    about = "Vendor Go dependencies into ./vendor and track them in a manifest"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        help = "Treat a malformed manifest as empty instead of failing"
    )]
    pub force: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FetchFlags {
    #[arg(long, help = "Vendor only the requested path, not its imports")]
    pub no_recurse: bool,
    #[arg(long, help = "Allow insecure protocols (http://, git://)")]
    pub insecure: bool,
    #[arg(short = 't', long, help = "Include _test.go files and testdata")]
    pub tests: bool,
    #[arg(short = 'a', long, help = "Include every file and directory")]
    pub all: bool,
    #[arg(short = 'v', long, help = "Show VCS output")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Vendor an import path and everything it imports
    Fetch {
        import_path: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, conflicts_with = "revision")]
        tag: Option<String>,
        #[arg(long)]
        revision: Option<String>,
        #[command(flatten)]
        flags: FetchFlags,
    },
    /// Retry every fetch recorded as failed
    Fix {
        #[command(flatten)]
        flags: FetchFlags,
    },
    /// Vendor every import referenced by the project's own sources
    Init {
        #[command(flatten)]
        flags: FetchFlags,
    },
    /// List vendored dependencies
    List,
    /// Remove a vendored dependency
    Delete {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        import_path: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Move a vendored dependency to the tip of its recorded branch
    Update {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        import_path: Option<String>,
        #[arg(long)]
        all: bool,
        #[arg(short = 'v', long)]
        verbose: bool,
    },
    /// Re-create the vendor tree from the manifest
    #[command(alias = "rebuild")]
    Restore {
        #[arg(short = 'v', long)]
        verbose: bool,
    },
}
