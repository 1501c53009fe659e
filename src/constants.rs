/// Constants used by the retrying fetcher and HTTP transport.
pub mod fetch {
    use std::time::Duration;

    /// Attempts made per request before returning the failure sentinel.
    pub const DEFAULT_MAX_ATTEMPTS: usize = 5;
    /// Fixed pause between attempts. No backoff growth, no jitter.
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);
    /// Per-request timeout enforced by the transport.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// User agent sent by the HTTP transport.
    pub const USER_AGENT: &str = "panning/0.1";
}

/// Constants used by the chunked dispatcher.
pub mod dispatch {
    /// Thread name prefix for dispatcher pool threads.
    pub const WORKER_THREAD_PREFIX: &str = "panning-worker";
    /// Reason reported when a worker panics without a string payload.
    pub const UNKNOWN_PANIC_REASON: &str = "worker panicked with a non-string payload";
}

/// Constants used by two-stage population sampling.
pub mod panning {
    /// First record offset of an archive (archives page from 1).
    pub const FIRST_OFFSET: usize = 1;
    /// Page width used when none is configured.
    pub const DEFAULT_SPLIT_WIDTH: usize = 1000;
    /// Splits drawn per query when none is configured.
    pub const DEFAULT_N_SPLITS: usize = 1000;
    /// Records drawn per split when none is configured.
    pub const DEFAULT_PER_SPLIT: usize = 100;
    /// In-flight split fetches per dispatcher chunk.
    pub const DEFAULT_CHUNK_SIZE: usize = 50;
    /// Worker threads used for split fetches.
    pub const DEFAULT_MAX_WORKERS: usize = 50;
}

/// Constants used by the stratified quota sampler.
pub mod quota {
    /// Added to every draw weight before normalization so a pool never sums to zero.
    pub const WEIGHT_EPSILON: f64 = 1e-6;
    /// Average character budget per sentence of an extract.
    pub const DEFAULT_CHARS_PER_UNIT: usize = 200;
    /// Sentences required on each side of the target sentence.
    pub const DEFAULT_ADJACENT: usize = 2;
    /// Candidates drawn per criterion when none is configured.
    pub const DEFAULT_QUOTA: usize = 2;
    /// Global sample size when none is configured.
    pub const DEFAULT_TARGET: usize = 1200;
    /// Default RNG seed for reproducible sample assembly.
    pub const DEFAULT_SEED: u64 = 42;
}

/// Constants used by query and criteria construction.
pub mod criteria {
    /// Separator joining query components.
    pub const QUERY_JOINER: &str = " AND ";
    /// Separator joining sentences of one extract.
    pub const EXTRACT_JOINER: &str = "\n\n";
}

/// Constants used by archive adapters.
pub mod archive {
    /// Default SRU endpoint of the newspaper archive.
    pub const DEFAULT_SRU_ENDPOINT: &str = "http://jsru.kb.nl/sru/sru";
    /// SRU protocol version parameter.
    pub const SRU_VERSION: &str = "1.2";
    /// Collection queried on the SRU endpoint.
    pub const SRU_COLLECTION: &str = "DDD_artikel";
    /// Record schema requested from the SRU endpoint.
    pub const SRU_RECORD_SCHEMA: &str = "dc";
    /// Element carrying the total match count.
    pub const SRU_COUNT_ELEMENT: &[u8] = b"srw:numberOfRecords";
    /// Element wrapping one record.
    pub const SRU_RECORD_ELEMENT: &[u8] = b"srw:record";
    /// Element carrying a record identifier.
    pub const SRU_IDENTIFIER_ELEMENT: &[u8] = b"dc:identifier";
    /// Default datasets-server base URL for the rows adapter.
    pub const DEFAULT_ROWS_ENDPOINT: &str = "https://datasets-server.huggingface.co";
    /// Most rows the datasets-server `/rows` and `/filter` routes return per request.
    pub const ROWS_MAX_PAGE_WIDTH: usize = 100;
    /// Field on each rows entry carrying the row index.
    pub const ROWS_INDEX_FIELD: &str = "row_idx";
}

/// Constants used by artifact files.
pub mod artifacts {
    /// File name suffix for a query's newline-delimited sampled record identifiers.
    pub const RECORD_IDS_FILE: &str = "record_ids.txt";
    /// File name suffix for a query's panning report.
    pub const PANNING_REPORT_FILE: &str = "panning_report.json";
    /// File name for the stratified sample table.
    pub const SAMPLE_TABLE_FILE: &str = "sampled.json";
}
