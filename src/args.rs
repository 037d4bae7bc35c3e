use clap::Parser;

/// Command line client for entering polling station results into a
/// tallying server.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (url) Base URL of the tallying server, e.g. http://localhost:8080
    #[clap(short, long, value_parser)]
    pub server: String,

    /// (string, optional) Session cookie to attach to every request.
    #[clap(long, value_parser)]
    pub cookie: Option<String>,

    /// (file path) The election metadata in JSON format: id, name, recount
    /// flag and the political groups with their candidates.
    #[clap(short, long, value_parser)]
    pub election: String,

    /// The id of the polling station to enter results for.
    #[clap(short, long, value_parser)]
    pub polling_station: u32,

    /// Which of the two independent entry passes this is (1 or 2).
    #[clap(long, value_parser, default_value = "1")]
    pub entry: u8,

    /// (file path, optional) The results to enter, in the server's result
    /// schema (JSON). When omitted, the claimed entry is only inspected.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (file path, optional) A reference file with the expected server-side
    /// record. After the run the claimed record is compared against it and
    /// differences are reported.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// If passed, warnings reported by the server are accepted section by
    /// section and the sections resubmitted.
    #[clap(long, takes_value = false)]
    pub accept_warnings: bool,

    /// If passed, the entry is finalised once every section is clean.
    #[clap(long, takes_value = false)]
    pub finalise: bool,

    /// If passed, the entry is paused after submitting: values are
    /// persisted and the slot stays claimable.
    #[clap(long, takes_value = false)]
    pub abort: bool,

    /// If passed, the server-side entry is discarded instead of edited.
    #[clap(long, takes_value = false)]
    pub delete: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
