use clap::Parser;

/// Ballot ingestion and results tabulation program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) JSON file with the reference dataset: the geographic
    /// hierarchy, the expected electoral tables and the political parties.
    #[clap(short, long, value_parser)]
    pub reference: String,

    /// (URI, repeatable) Ballot artifact to ingest. http(s) URIs are fetched
    /// from the gateway; anything else is read as a local file path.
    #[clap(short, long, value_parser)]
    pub ingest: Vec<String>,

    /// (name) The report to produce: quick-count, location, circunscripcion,
    /// progress, heat-map, stats, list, nearest or ballot.
    #[clap(long, value_parser)]
    pub report: Option<String>,

    /// (presidential or deputies, default presidential) Which vote list the
    /// location, circunscripcion and heat-map reports read.
    #[clap(long, value_parser)]
    pub election_type: Option<String>,

    /// (department, province or municipality) Grouping level for the
    /// heat-map report.
    #[clap(long, value_parser)]
    pub location_type: Option<String>,

    /// Geography and district filters applied to the selected report.
    #[clap(long, value_parser)]
    pub department: Option<String>,
    #[clap(long, value_parser)]
    pub province: Option<String>,
    #[clap(long, value_parser)]
    pub municipality: Option<String>,
    #[clap(long, value_parser)]
    pub electoral_seat: Option<String>,
    #[clap(long, value_parser)]
    pub table_number: Option<String>,
    #[clap(long, value_parser)]
    pub circunscripcion_type: Option<String>,
    #[clap(long, value_parser)]
    pub circunscripcion_number: Option<u32>,

    /// (table code) Ballot looked up by the ballot report.
    #[clap(long, value_parser)]
    pub table_code: Option<String>,

    /// Pagination and status filter for the list report.
    #[clap(long, value_parser)]
    pub page: Option<u64>,
    #[clap(long, value_parser)]
    pub limit: Option<u64>,
    #[clap(long, value_parser)]
    pub status: Option<String>,

    /// Query point for the nearest report.
    #[clap(long, value_parser)]
    pub latitude: Option<f64>,
    #[clap(long, value_parser)]
    pub longitude: Option<f64>,
    /// (meters, default 5000) Search radius for the nearest report.
    #[clap(long, value_parser)]
    pub max_distance: Option<f64>,

    /// (file path or 'stdout', default stdout) Where the report JSON is
    /// written.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference report in JSON format. If provided, actacount
    /// will check that the produced report matches the reference.
    #[clap(short, long, value_parser)]
    pub check: Option<String>,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
